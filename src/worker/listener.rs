//! # Event Listener
//!
//! Drains the event channel and drives each request through the store:
//!
//! 1. Requests without a destination become `MissingDestination` outcomes.
//! 2. The event is persisted, then `process_event` runs the atomic transition.
//! 3. The result maps to an [`OutcomeCode`]; the outcome is persisted.
//! 4. Non-Ok outcomes are posted on the notifications channel, if any.
//!
//! The listener exits once every event sender is dropped and the buffer is
//! drained. Dropping the listener drops its notification sender, which in
//! turn lets the error publisher finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::NEVER_EXPIRE;
use crate::events::{EventReceiver, NotificationSender};
use crate::models::{Event, EventOutcome, EventRequest, OutcomeCode};
use crate::storage::{EntityKind, StoreError, StoreService};

#[derive(Debug, Default)]
pub struct ListenerStats {
    pub received: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub notifications_sent: AtomicU64,
}

impl ListenerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }
}

/// Map a `process_event` failure to the outcome code reported to callers
pub fn outcome_code(error: &StoreError) -> OutcomeCode {
    match error {
        StoreError::NotFound {
            entity: EntityKind::Fsm,
            ..
        } => OutcomeCode::FsmNotFound,
        StoreError::NotFound {
            entity: EntityKind::Configuration,
            ..
        } => OutcomeCode::ConfigNotFound,
        StoreError::TransitionNotAllowed { .. } => OutcomeCode::TransitionNotAllowed,
        _ => OutcomeCode::InternalError,
    }
}

#[derive(Debug)]
pub struct EventListener {
    store: Arc<dyn StoreService>,
    notifications: Option<NotificationSender>,
    event_ttl: Duration,
    outcome_ttl: Duration,
    stats: Arc<ListenerStats>,
}

impl EventListener {
    pub fn new(store: Arc<dyn StoreService>, notifications: Option<NotificationSender>) -> Self {
        Self {
            store,
            notifications,
            event_ttl: NEVER_EXPIRE,
            outcome_ttl: NEVER_EXPIRE,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Expire persisted events and outcomes; zero keeps them forever
    pub fn with_ttls(mut self, event_ttl: Duration, outcome_ttl: Duration) -> Self {
        self.event_ttl = event_ttl;
        self.outcome_ttl = outcome_ttl;
        self
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    pub fn spawn(self, events: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(self, mut events: EventReceiver) {
        info!(
            store = self.store.provider_name(),
            notifications = self.notifications.is_some(),
            "Event listener started"
        );

        while let Some(request) = events.recv().await {
            self.process_request(request).await;
        }

        info!(
            received = self.stats.received(),
            succeeded = self.stats.succeeded(),
            failed = self.stats.failed(),
            "Event channel closed, event listener stopped"
        );
    }

    /// Handle one request end to end and return the persisted outcome
    #[instrument(skip(self, request), fields(config = %request.config, id = %request.id))]
    pub async fn process_request(&self, mut request: EventRequest) -> EventOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let event_id = request.ensure_identity();

        let outcome = if request.has_destination() {
            let event = request.event.take().unwrap_or_default();
            self.apply(&event, &request.config, &request.id).await
        } else {
            warn!(event_id = %event_id, "Event has no destination");
            EventOutcome::new(
                event_id,
                &request.config,
                &request.id,
                OutcomeCode::MissingDestination,
                "both config and id are required",
            )
        };

        self.record(&outcome).await;
        outcome
    }

    async fn apply(&self, event: &Event, cfg_name: &str, id: &str) -> EventOutcome {
        let event_id = event.id();

        if let Err(e) = self.store.put_event(event, cfg_name, self.event_ttl).await {
            error!(event_id = %event_id, error = %e, "Failed to persist event");
            return EventOutcome::new(
                event_id,
                cfg_name,
                id,
                OutcomeCode::InternalError,
                e.to_string(),
            );
        }

        match self.store.process_event(id, cfg_name, event).await {
            Ok(fsm) => {
                debug!(event_id = %event_id, state = %fsm.state, "Event applied");
                EventOutcome::new(
                    event_id,
                    cfg_name,
                    id,
                    OutcomeCode::Ok,
                    format!("transitioned to {}", fsm.state),
                )
            }
            Err(e) => {
                let code = outcome_code(&e);
                debug!(event_id = %event_id, code = %code, error = %e, "Event rejected");
                EventOutcome::new(event_id, cfg_name, id, code, e.to_string())
            }
        }
    }

    async fn record(&self, outcome: &EventOutcome) {
        if outcome.code.is_ok() {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(e) = self
            .store
            .add_outcome(
                &outcome.event_id,
                &outcome.config,
                outcome,
                self.outcome_ttl,
            )
            .await
        {
            error!(event_id = %outcome.event_id, error = %e, "Failed to persist outcome");
        }

        if outcome.code.is_ok() {
            return;
        }
        if let Some(notifications) = &self.notifications {
            match notifications.send(outcome.clone()).await {
                Ok(()) => {
                    self.stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    warn!(event_id = %outcome.event_id, "Notifications channel closed");
                }
            }
        }
    }
}
