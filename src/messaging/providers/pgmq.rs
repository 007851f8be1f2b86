//! # PGMQ Messaging Service
//!
//! PostgreSQL message queues through the `pgmq` crate. pgmq message ids
//! double as acknowledgement handles. Queue existence is read from the
//! extension's `pgmq.meta` catalog.

use std::time::Duration;

use async_trait::async_trait;
use pgmq::PGMQueue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::messaging::errors::MessagingError;
use crate::messaging::traits::MessagingService;
use crate::messaging::types::{MessageId, QueuedMessage};

const POOL_MAX_CONNECTIONS: u32 = 5;
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const QUEUE_EXISTS_SQL: &str = "SELECT EXISTS (SELECT 1 FROM pgmq.meta WHERE queue_name = $1)";

#[derive(Debug, Clone)]
pub struct PgmqMessagingService {
    queue: PGMQueue,
}

impl PgmqMessagingService {
    /// Connect a small pool to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, MessagingError> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        info!("Connected to pgmq");
        Ok(Self::with_pool(pool).await)
    }

    pub async fn with_pool(pool: PgPool) -> Self {
        Self {
            queue: PGMQueue::new_with_pool(pool).await,
        }
    }

    fn pool(&self) -> &PgPool {
        &self.queue.connection
    }
}

#[async_trait]
impl MessagingService for PgmqMessagingService {
    async fn create_queue(&self, queue: &str) -> Result<(), MessagingError> {
        self.queue
            .create(queue)
            .await
            .map_err(|e| MessagingError::queue(queue, "create", e))
    }

    async fn queue_exists(&self, queue: &str) -> Result<bool, MessagingError> {
        sqlx::query_scalar::<_, bool>(QUEUE_EXISTS_SQL)
            .bind(queue)
            .fetch_one(self.pool())
            .await
            .map_err(|e| MessagingError::queue(queue, "lookup", e))
    }

    async fn send_message<T>(&self, queue: &str, message: &T) -> Result<MessageId, MessagingError>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(message)?;
        self.queue
            .send(queue, &payload)
            .await
            .map(MessageId)
            .map_err(|e| MessagingError::queue(queue, "send", e))
    }

    async fn receive_messages<T>(
        &self,
        queue: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError>
    where
        T: DeserializeOwned + Send,
    {
        let vt = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let limit = i32::try_from(max_messages).unwrap_or(i32::MAX);

        let batch = self
            .queue
            .read_batch::<serde_json::Value>(queue, Some(vt), limit)
            .await
            .map_err(|e| MessagingError::queue(queue, "read", e))?
            .unwrap_or_default();

        batch
            .into_iter()
            .map(|msg| {
                Ok(QueuedMessage {
                    id: MessageId(msg.msg_id),
                    message: serde_json::from_value(msg.message)?,
                    receive_count: u32::try_from(msg.read_ct).unwrap_or(0),
                    enqueued_at: msg.enqueued_at,
                })
            })
            .collect()
    }

    async fn ack_message(&self, queue: &str, id: MessageId) -> Result<(), MessagingError> {
        let deleted = self
            .queue
            .delete(queue, id.0)
            .await
            .map_err(|e| MessagingError::queue(queue, "delete", e))?;
        if deleted == 0 {
            return Err(MessagingError::UnknownMessage {
                queue: queue.to_string(),
                id,
            });
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
