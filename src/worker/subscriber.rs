//! # Queue Subscriber
//!
//! Polling consumer for the ingress queue. Each received message is decoded
//! into an [`EventRequest`], stamped with an event id and timestamp, forwarded
//! on the event channel and then acknowledged.
//!
//! Messages that fail to decode, carry no event body or name no destination
//! instance are acknowledged and dropped. A message is left unacknowledged
//! only when the event channel has closed, so it is redelivered after the
//! visibility timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::config::{ConfigResult, ConfigurationError, QueuesConfig};
use crate::constants::DEFAULT_ACK_RETRIES;
use crate::events::EventSender;
use crate::messaging::{MessageId, MessagingError, MessagingProvider, QueuedMessage};
use crate::models::EventRequest;

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub queue_name: String,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub ack_retries: u32,
    /// Base delay between acknowledgement attempts, scaled by attempt number
    pub ack_backoff: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_name: "fsm_events".to_string(),
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            ack_retries: DEFAULT_ACK_RETRIES,
            ack_backoff: Duration::from_millis(50),
        }
    }
}

impl SubscriberConfig {
    pub fn from_queues(queues: &QueuesConfig) -> Self {
        Self {
            queue_name: queues.events_queue.clone(),
            poll_interval: queues.poll_interval(),
            batch_size: queues.batch_size,
            visibility_timeout: queues.visibility_timeout(),
            ack_retries: queues.ack_retries,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue_name.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue_name",
                "subscriber",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_size",
                "0",
                "batch size must be at least 1",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "poll_interval",
                "0",
                "poll interval must be greater than zero",
            ));
        }
        if self.ack_retries == 0 {
            return Err(ConfigurationError::invalid_value(
                "ack_retries",
                "0",
                "at least one acknowledgement attempt is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SubscriberStats {
    pub polling_cycles: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_forwarded: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub ack_failures: AtomicU64,
}

impl SubscriberStats {
    pub fn polling_cycles(&self) -> u64 {
        self.polling_cycles.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_forwarded(&self) -> u64 {
        self.messages_forwarded.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn ack_failures(&self) -> u64 {
        self.ack_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct QueueSubscriber {
    messaging: Arc<MessagingProvider>,
    events: EventSender,
    config: SubscriberConfig,
    stats: Arc<SubscriberStats>,
}

impl QueueSubscriber {
    pub fn new(
        messaging: Arc<MessagingProvider>,
        events: EventSender,
        config: SubscriberConfig,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            messaging,
            events,
            config,
            stats: Arc::new(SubscriberStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<SubscriberStats> {
        self.stats.clone()
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until `shutdown` flips to true or its sender is dropped
    #[instrument(skip(self, shutdown), fields(queue = %self.config.queue_name))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            batch_size = self.config.batch_size,
            "Queue subscriber started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            self.stats.polling_cycles.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.clone().poll_once().await {
                warn!(error = %e, "Poll iteration failed");
            }
        }

        info!(
            received = self.stats.messages_received(),
            forwarded = self.stats.messages_forwarded(),
            "Queue subscriber stopped"
        );
    }

    /// Receive one batch and process every message in it concurrently
    pub async fn poll_once(self: Arc<Self>) -> Result<usize, MessagingError> {
        let messages = self
            .messaging
            .receive_messages::<serde_json::Value>(
                &self.config.queue_name,
                self.config.batch_size,
                self.config.visibility_timeout,
            )
            .await?;

        if messages.is_empty() {
            return Ok(0);
        }

        let count = messages.len();
        debug!(count, "Processing ingress batch");
        self.stats
            .messages_received
            .fetch_add(count as u64, Ordering::Relaxed);

        let handles: Vec<_> = messages
            .into_iter()
            .map(|message| {
                let subscriber = self.clone();
                tokio::spawn(async move { subscriber.process_message(message).await })
            })
            .collect();

        for (idx, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(task_index = idx, error = %e, "Message processing task panicked");
            }
        }

        Ok(count)
    }

    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn process_message(&self, message: QueuedMessage<serde_json::Value>) {
        let message_id = message.id;

        let mut request = match codec::from_json_value::<EventRequest>(message.message) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed ingress message, dropping");
                self.drop_message(message_id).await;
                return;
            }
        };

        if let Some(reason) = undeliverable(&request) {
            warn!(config = %request.config, id = %request.id, reason, "Dropping ingress message");
            self.drop_message(message_id).await;
            return;
        }

        let event_id = request.ensure_identity();
        if self.events.send(request).await.is_err() {
            warn!(event_id = %event_id, "Event channel closed, leaving message for redelivery");
            return;
        }
        self.stats.messages_forwarded.fetch_add(1, Ordering::Relaxed);
        debug!(event_id = %event_id, "Forwarded ingress event");

        self.ack(message_id).await;
    }

    async fn drop_message(&self, message_id: MessageId) {
        self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        self.ack(message_id).await;
    }

    async fn ack(&self, message_id: MessageId) {
        for attempt in 1..=self.config.ack_retries {
            match self
                .messaging
                .ack_message(&self.config.queue_name, message_id)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to acknowledge message");
                    if attempt < self.config.ack_retries {
                        tokio::time::sleep(self.config.ack_backoff * attempt).await;
                    }
                }
            }
        }

        self.stats.ack_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            attempts = self.config.ack_retries,
            "Giving up on acknowledgement, message will be redelivered"
        );
    }
}

/// Why a decoded request cannot be forwarded, if it cannot
fn undeliverable(request: &EventRequest) -> Option<&'static str> {
    match &request.event {
        None => Some("missing event body"),
        Some(event) if event.event_name().is_empty() => Some("missing transition event"),
        Some(_) if !request.has_destination() => Some("missing destination"),
        Some(_) => None,
    }
}
