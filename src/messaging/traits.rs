//! # Messaging Service Trait
//!
//! Queue operations shared by the pgmq and in-memory backends. Payloads are
//! JSON on the wire regardless of backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::MessagingError;
use super::types::{MessageId, QueuedMessage};

#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Create `queue` unless it already exists
    async fn create_queue(&self, queue: &str) -> Result<(), MessagingError>;

    async fn queue_exists(&self, queue: &str) -> Result<bool, MessagingError>;

    async fn send_message<T>(&self, queue: &str, message: &T) -> Result<MessageId, MessagingError>
    where
        T: Serialize + Sync;

    /// Receive up to `max_messages`, hiding each for `visibility_timeout`.
    ///
    /// Messages not acknowledged before the timeout become visible again.
    async fn receive_messages<T>(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError>
    where
        T: DeserializeOwned + Send;

    /// Delete a processed message
    async fn ack_message(&self, queue: &str, id: MessageId) -> Result<(), MessagingError>;

    fn provider_name(&self) -> &'static str;
}
