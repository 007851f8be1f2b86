//! Queue message identity and delivery envelope

use std::fmt;

use chrono::{DateTime, Utc};

/// Queue-assigned id of a message; also the handle used to acknowledge it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One delivery of a queued payload
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub id: MessageId,
    pub message: T,
    /// Deliveries so far, this one included
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}
