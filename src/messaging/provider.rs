//! # Messaging Provider Enum
//!
//! Enum dispatch over the messaging backends. `MessagingService` has generic
//! methods, so it cannot be used as a trait object.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::errors::MessagingError;
use super::providers::{InMemoryMessagingService, PgmqMessagingService};
use super::traits::MessagingService;
use super::types::{MessageId, QueuedMessage};
use crate::config::{QueueBackend, QueuesConfig};

#[derive(Debug)]
pub enum MessagingProvider {
    /// PostgreSQL message queue
    Pgmq(PgmqMessagingService),

    /// Process-local queues
    InMemory(InMemoryMessagingService),
}

impl MessagingProvider {
    /// Build the backend selected by `config` and check its queues.
    ///
    /// The events queue must already exist on pgmq; the DLQ is created on
    /// demand. The in-memory backend creates both.
    pub async fn from_config(config: &QueuesConfig) -> Result<Self, MessagingError> {
        let provider = match config.backend {
            QueueBackend::Pgmq => {
                Self::Pgmq(PgmqMessagingService::connect(&config.endpoint).await?)
            }
            QueueBackend::InMemory => {
                let service = InMemoryMessagingService::new();
                service.create_queue(&config.events_queue).await?;
                Self::InMemory(service)
            }
        };

        provider.require_queue(&config.events_queue).await?;
        if let Some(dlq) = config.dlq() {
            provider.create_queue(dlq).await?;
        }

        info!(
            provider = provider.provider_name(),
            events_queue = %config.events_queue,
            dlq = config.dlq().unwrap_or("-"),
            "Messaging provider initialized"
        );
        Ok(provider)
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Pgmq(s) => s.provider_name(),
            Self::InMemory(s) => s.provider_name(),
        }
    }

    pub fn as_in_memory(&self) -> Option<&InMemoryMessagingService> {
        match self {
            Self::InMemory(s) => Some(s),
            Self::Pgmq(_) => None,
        }
    }

    /// Fail with `MissingQueue` unless `queue` exists
    pub async fn require_queue(&self, queue: &str) -> Result<(), MessagingError> {
        let exists = match self {
            Self::Pgmq(s) => s.queue_exists(queue).await?,
            Self::InMemory(s) => s.queue_exists(queue).await?,
        };
        if exists {
            Ok(())
        } else {
            Err(MessagingError::missing_queue(queue))
        }
    }

    pub async fn create_queue(&self, queue: &str) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.create_queue(queue).await,
            Self::InMemory(s) => s.create_queue(queue).await,
        }
    }

    pub async fn send_message<T>(
        &self,
        queue: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError>
    where
        T: Serialize + Sync,
    {
        match self {
            Self::Pgmq(s) => s.send_message(queue, message).await,
            Self::InMemory(s) => s.send_message(queue, message).await,
        }
    }

    pub async fn receive_messages<T>(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError>
    where
        T: DeserializeOwned + Send,
    {
        match self {
            Self::Pgmq(s) => {
                s.receive_messages(queue, max_messages, visibility_timeout)
                    .await
            }
            Self::InMemory(s) => {
                s.receive_messages(queue, max_messages, visibility_timeout)
                    .await
            }
        }
    }

    pub async fn ack_message(&self, queue: &str, id: MessageId) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ack_message(queue, id).await,
            Self::InMemory(s) => s.ack_message(queue, id).await,
        }
    }
}
