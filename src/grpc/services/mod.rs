//! gRPC service implementations and error mapping.

pub mod statemachine;

pub use statemachine::StatemachineServiceImpl;

use tonic::Status;

use crate::state_machine::StateMachineError;
use crate::storage::StoreError;

impl From<StoreError> for Status {
    fn from(error: StoreError) -> Self {
        match &error {
            StoreError::NotFound { .. } => Status::not_found(error.to_string()),
            StoreError::AlreadyExists { .. } => Status::already_exists(error.to_string()),
            _ => Status::internal(error.to_string()),
        }
    }
}

impl From<StateMachineError> for Status {
    fn from(error: StateMachineError) -> Self {
        if error.is_validation() {
            Status::invalid_argument(error.to_string())
        } else {
            Status::internal(error.to_string())
        }
    }
}
