//! # Error Publisher
//!
//! Forwards failure outcomes from the notifications channel to the dead-letter
//! queue as JSON. Publish failures are logged and skipped; the stored outcome
//! stays the source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::events::NotificationReceiver;
use crate::messaging::MessagingProvider;
use crate::models::EventOutcome;

#[derive(Debug, Default)]
pub struct ErrorPublisherStats {
    pub published: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
}

impl ErrorPublisherStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct ErrorPublisher {
    messaging: Arc<MessagingProvider>,
    dlq: String,
    stats: Arc<ErrorPublisherStats>,
}

impl ErrorPublisher {
    pub fn new(messaging: Arc<MessagingProvider>, dlq: impl Into<String>) -> Self {
        Self {
            messaging,
            dlq: dlq.into(),
            stats: Arc::new(ErrorPublisherStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ErrorPublisherStats> {
        self.stats.clone()
    }

    pub fn spawn(self, notifications: NotificationReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(notifications))
    }

    pub async fn run(self, mut notifications: NotificationReceiver) {
        info!(dlq = %self.dlq, "Error publisher started");

        while let Some(outcome) = notifications.recv().await {
            self.publish(&outcome).await;
        }

        info!(
            published = self.stats.published(),
            failed = self.stats.failed(),
            "Notifications channel closed, error publisher stopped"
        );
    }

    pub async fn publish(&self, outcome: &EventOutcome) {
        if outcome.code.is_ok() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.messaging.send_message(&self.dlq, outcome).await {
            Ok(message_id) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_id = %outcome.event_id,
                    code = %outcome.code,
                    message_id = %message_id,
                    "Published outcome to DLQ"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %outcome.event_id,
                    error = %e,
                    "Failed to publish outcome to DLQ"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channel;
    use crate::messaging::InMemoryMessagingService;
    use crate::models::OutcomeCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publishes_failures_and_skips_ok() {
        let messaging = Arc::new(MessagingProvider::InMemory(
            InMemoryMessagingService::with_queues(&["dlq"]),
        ));
        let publisher = ErrorPublisher::new(messaging.clone(), "dlq");
        let stats = publisher.stats();
        let (tx, rx) = channel(4);
        let handle = publisher.spawn(rx);

        tx.send(EventOutcome::new("e1", "orders", "ord-1", OutcomeCode::Ok, ""))
            .await
            .unwrap();
        tx.send(EventOutcome::new(
            "e2",
            "orders",
            "missing",
            OutcomeCode::FsmNotFound,
            "",
        ))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(stats.published(), 1);
        assert_eq!(stats.skipped(), 1);

        let dead = messaging
            .receive_messages::<EventOutcome>("dlq", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.event_id, "e2");
        assert_eq!(dead[0].message.code, OutcomeCode::FsmNotFound);
    }

    #[tokio::test]
    async fn test_publish_failure_is_counted() {
        let messaging = Arc::new(MessagingProvider::InMemory(InMemoryMessagingService::new()));
        let publisher = ErrorPublisher::new(messaging, "absent");

        publisher
            .publish(&EventOutcome::new(
                "e1",
                "orders",
                "",
                OutcomeCode::MissingDestination,
                "",
            ))
            .await;

        assert_eq!(publisher.stats().failed(), 1);
    }
}
