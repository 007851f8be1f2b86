//! # In-Memory Messaging Service
//!
//! Process-local queues with visibility timeouts. Selected with
//! `queues.backend = "in_memory"` for single-process deployments, and used
//! throughout the test suite.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::messaging::errors::MessagingError;
use crate::messaging::traits::MessagingService;
use crate::messaging::types::{MessageId, QueuedMessage};

#[derive(Debug)]
struct Entry {
    id: MessageId,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    hidden_until: Option<DateTime<Utc>>,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<Entry>,
    last_id: i64,
}

/// In-memory messaging service
///
/// # Example
///
/// ```rust
/// use statemachine::messaging::{InMemoryMessagingService, MessagingService};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let service = InMemoryMessagingService::new();
/// service.create_queue("fsm_events").await.unwrap();
///
/// service
///     .send_message("fsm_events", &serde_json::json!({"config": "orders", "id": "ord-1"}))
///     .await
///     .unwrap();
///
/// let received = service
///     .receive_messages::<serde_json::Value>("fsm_events", 10, Duration::from_secs(30))
///     .await
///     .unwrap();
/// assert_eq!(received.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    queues: RwLock<HashMap<String, Queue>>,
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queues(names: &[&str]) -> Self {
        let queues = names
            .iter()
            .map(|name| (name.to_string(), Queue::default()))
            .collect();
        Self {
            queues: RwLock::new(queues),
        }
    }

    /// Messages still held by `queue`, hidden ones included
    pub async fn queue_length(&self, queue: &str) -> usize {
        self.queues
            .read()
            .await
            .get(queue)
            .map_or(0, |q| q.entries.len())
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn create_queue(&self, queue: &str) -> Result<(), MessagingError> {
        self.queues
            .write()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn queue_exists(&self, queue: &str) -> Result<bool, MessagingError> {
        Ok(self.queues.read().await.contains_key(queue))
    }

    async fn send_message<T>(&self, queue: &str, message: &T) -> Result<MessageId, MessagingError>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(message)?;

        let mut queues = self.queues.write().await;
        let target = queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::missing_queue(queue))?;

        target.last_id += 1;
        let id = MessageId(target.last_id);
        target.entries.push_back(Entry {
            id,
            payload,
            enqueued_at: Utc::now(),
            hidden_until: None,
            receive_count: 0,
        });
        Ok(id)
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
        let visibility = chrono::Duration::from_std(visibility_timeout)
            .map_err(|e| MessagingError::queue(queue, "receive", e))?;

        let mut queues = self.queues.write().await;
        let source = queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::missing_queue(queue))?;

        let now = Utc::now();
        let mut received = Vec::new();
        for entry in source
            .entries
            .iter_mut()
            .filter(|e| e.hidden_until.map_or(true, |until| until <= now))
            .take(max_messages)
        {
            let message = T::deserialize(&entry.payload)?;
            entry.hidden_until = Some(now + visibility);
            entry.receive_count += 1;
            received.push(QueuedMessage {
                id: entry.id,
                message,
                receive_count: entry.receive_count,
                enqueued_at: entry.enqueued_at,
            });
        }
        Ok(received)
    }

    async fn ack_message(&self, queue: &str, id: MessageId) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        let source = queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::missing_queue(queue))?;

        let position = source
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| MessagingError::UnknownMessage {
                queue: queue.to_string(),
                id,
            })?;
        source.entries.remove(position);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventRequest};

    fn request(id: &str) -> EventRequest {
        EventRequest::new(Event::named("ship"), "orders", id)
    }

    #[tokio::test]
    async fn test_send_and_receive_in_order() {
        let service = InMemoryMessagingService::with_queues(&["q"]);
        service.send_message("q", &request("ord-1")).await.unwrap();
        service.send_message("q", &request("ord-2")).await.unwrap();

        let received = service
            .receive_messages::<EventRequest>("q", 10, Duration::from_secs(30))
            .await
            .unwrap();

        let ids: Vec<_> = received.iter().map(|m| m.message.id.as_str()).collect();
        assert_eq!(ids, vec!["ord-1", "ord-2"]);
        assert_eq!(received[0].receive_count, 1);
        assert!(received[0].id < received[1].id);
    }

    #[tokio::test]
    async fn test_received_messages_are_hidden_until_timeout() {
        let service = InMemoryMessagingService::with_queues(&["q"]);
        service.send_message("q", &request("ord-1")).await.unwrap();

        let first = service
            .receive_messages::<EventRequest>("q", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = service
            .receive_messages::<EventRequest>("q", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_zero_visibility_redelivers() {
        let service = InMemoryMessagingService::with_queues(&["q"]);
        service.send_message("q", &request("ord-1")).await.unwrap();

        service
            .receive_messages::<EventRequest>("q", 1, Duration::ZERO)
            .await
            .unwrap();
        let again = service
            .receive_messages::<EventRequest>("q", 1, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_ack_removes_message_once() {
        let service = InMemoryMessagingService::with_queues(&["q"]);
        service.send_message("q", &request("ord-1")).await.unwrap();

        let received = service
            .receive_messages::<EventRequest>("q", 1, Duration::from_secs(30))
            .await
            .unwrap();
        service.ack_message("q", received[0].id).await.unwrap();
        assert_eq!(service.queue_length("q").await, 0);

        let again = service.ack_message("q", received[0].id).await;
        assert!(matches!(again, Err(MessagingError::UnknownMessage { .. })));
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let service = InMemoryMessagingService::new();
        assert!(!service.queue_exists("fsm_events").await.unwrap());

        let result = service.send_message("fsm_events", &request("ord-1")).await;
        assert!(matches!(result, Err(MessagingError::MissingQueue(_))));

        service.create_queue("fsm_events").await.unwrap();
        service.create_queue("fsm_events").await.unwrap();
        assert!(service.queue_exists("fsm_events").await.unwrap());
    }
}
