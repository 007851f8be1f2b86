//! Store error types

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::state_machine::StateMachineError;

/// Kind of record a store error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Configuration,
    Fsm,
    Event,
    Outcome,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Fsm => "fsm",
            Self::Event => "event",
            Self::Outcome => "outcome",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: EntityKind, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: EntityKind, key: String },

    #[error("event '{event}' is not allowed in state '{state}'")]
    TransitionNotAllowed { state: String, event: String },

    /// The optimistic transaction kept losing to concurrent writers
    #[error("concurrent modification of {key}, gave up after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// A commit was sent but its reply was lost; it may or may not have applied
    #[error("commit of {key} has unknown outcome: {message}")]
    CommitUnknown { key: String, message: String },

    #[error("store operation {operation} timed out after {attempts} attempts")]
    Timeout {
        operation: &'static str,
        attempts: u32,
    },

    /// Network-level failure eligible for retry
    #[error("transient store failure during {operation}: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },

    #[error("store backend error during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("store connection error: {message}")]
    Connection { message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    pub fn not_found(entity: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn already_exists(entity: EntityKind, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            key: key.into(),
        }
    }

    pub fn conflict(key: impl Into<String>, attempts: u32) -> Self {
        Self::Conflict {
            key: key.into(),
            attempts,
        }
    }

    pub fn commit_unknown(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommitUnknown {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: &'static str, attempts: u32) -> Self {
        Self::Timeout {
            operation,
            attempts,
        }
    }

    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            operation,
            message: message.into(),
        }
    }

    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors the retry loop may attempt again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<StateMachineError> for StoreError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::TransitionNotAllowed { state, event } => {
                Self::TransitionNotAllowed { state, event }
            }
            other => Self::backend("apply", other.to_string()),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
