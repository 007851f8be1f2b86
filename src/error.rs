//! Error types for the statemachine service.
//!
//! Each layer keeps its own error enum; [`StatemachineError`] aggregates them
//! for bootstrap and shutdown.

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigurationError;
use crate::grpc::GrpcServerError;
use crate::messaging::MessagingError;
use crate::state_machine::StateMachineError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum StatemachineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("gRPC server error: {0}")]
    Grpc(#[from] GrpcServerError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Background task {task} failed: {message}")]
    Task { task: &'static str, message: String },
}

impl StatemachineError {
    pub fn task(task: &'static str, message: impl Into<String>) -> Self {
        Self::Task {
            task,
            message: message.into(),
        }
    }
}

pub type StatemachineResult<T> = Result<T, StatemachineError>;
