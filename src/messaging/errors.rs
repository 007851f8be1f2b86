//! Queue access errors

use thiserror::Error;

use super::types::MessageId;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("queue backend unreachable: {0}")]
    Connection(String),

    #[error("queue {queue}: {operation} failed: {message}")]
    Queue {
        queue: String,
        operation: &'static str,
        message: String,
    },

    #[error("queue {0} does not exist")]
    MissingQueue(String),

    #[error("message {id} is no longer in queue {queue}")]
    UnknownMessage { queue: String, id: MessageId },

    #[error("queue payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

impl MessagingError {
    pub fn queue(queue: &str, operation: &'static str, message: impl ToString) -> Self {
        Self::Queue {
            queue: queue.to_string(),
            operation,
            message: message.to_string(),
        }
    }

    pub fn missing_queue(queue: &str) -> Self {
        Self::MissingQueue(queue.to_string())
    }
}
