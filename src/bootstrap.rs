//! # Service Bootstrap
//!
//! Wires the store, messaging provider, channels, worker tasks and gRPC
//! server into one running service.
//!
//! ```text
//! gRPC SendEvent ─┐
//!                 ├─> events channel ─> EventListener ─> store
//! QueueSubscriber ┘                          │
//!                                            └─> notifications ─> ErrorPublisher ─> DLQ
//! ```
//!
//! [`ServiceHandle::shutdown`] stops ingress first, then lets the listener
//! drain the event channel, then the publisher drain notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::error::{StatemachineError, StatemachineResult};
use crate::events::channel;
use crate::grpc::{GrpcServer, GrpcServerHandle, GrpcState};
use crate::messaging::MessagingProvider;
use crate::storage::{self, StoreService};
use crate::worker::{
    ErrorPublisher, ErrorPublisherStats, EventListener, ListenerStats, QueueSubscriber,
    SubscriberConfig, SubscriberStats,
};

pub struct ServiceBootstrap;

impl ServiceBootstrap {
    /// Validate `config`, connect the store and the queues, and start
    /// every component
    pub async fn bootstrap(config: ServiceConfig) -> StatemachineResult<ServiceHandle> {
        config.validate()?;

        let store = storage::connect(&config.store).await?;
        store.set_log_verbosity(config.logging.verbosity);

        let messaging = Arc::new(MessagingProvider::from_config(&config.queues).await?);

        Self::bootstrap_with(config, store, messaging).await
    }

    /// Start every component over an existing store and messaging provider.
    ///
    /// The events queue must already exist; the DLQ is created if needed.
    pub async fn bootstrap_with(
        config: ServiceConfig,
        store: Arc<dyn StoreService>,
        messaging: Arc<MessagingProvider>,
    ) -> StatemachineResult<ServiceHandle> {
        config.validate()?;
        messaging.require_queue(&config.queues.events_queue).await?;
        if let Some(dlq) = config.queues.dlq() {
            messaging.create_queue(dlq).await?;
        }

        info!(
            release = %config.release,
            store = store.provider_name(),
            messaging = messaging.provider_name(),
            "Bootstrapping statemachine service"
        );

        let (events_tx, events_rx) = channel(config.channels.events_buffer);

        let (notifications_tx, publisher) = match config.queues.dlq() {
            Some(dlq) => {
                let (tx, rx) = channel(config.channels.notifications_buffer);
                let publisher = ErrorPublisher::new(messaging.clone(), dlq);
                let stats = publisher.stats();
                (Some(tx), Some((publisher.spawn(rx), stats)))
            }
            None => (None, None),
        };

        let listener = EventListener::new(store.clone(), notifications_tx)
            .with_ttls(config.store.event_ttl(), config.store.outcome_ttl());
        let listener_stats = listener.stats();
        let listener_handle = listener.spawn(events_rx);

        let subscriber = QueueSubscriber::new(
            messaging.clone(),
            events_tx.clone(),
            SubscriberConfig::from_queues(&config.queues),
        )?;
        let subscriber_stats = subscriber.stats();
        let (subscriber_shutdown, shutdown_rx) = watch::channel(false);
        let subscriber_handle = Arc::new(subscriber).spawn(shutdown_rx);

        let state = GrpcState::new(store.clone(), events_tx, config.release.clone());
        let grpc = match GrpcServer::new(config.grpc.clone(), state)
            .with_verbosity(config.logging.verbosity)
            .start()
            .await
        {
            Ok(grpc) => grpc,
            Err(e) => {
                error!(error = %e, "Failed to start gRPC server");
                let _ = subscriber_shutdown.send(true);
                return Err(e.into());
            }
        };

        info!(address = %grpc.local_addr(), "Statemachine service started");

        Ok(ServiceHandle {
            store,
            messaging,
            grpc: Some(grpc),
            subscriber_shutdown,
            subscriber: subscriber_handle,
            listener: listener_handle,
            publisher,
            listener_stats,
            subscriber_stats,
        })
    }
}

/// Running service; dropping it without [`ServiceHandle::shutdown`] leaves
/// the background tasks running
pub struct ServiceHandle {
    store: Arc<dyn StoreService>,
    messaging: Arc<MessagingProvider>,
    grpc: Option<GrpcServerHandle>,
    subscriber_shutdown: watch::Sender<bool>,
    subscriber: JoinHandle<()>,
    listener: JoinHandle<()>,
    publisher: Option<(JoinHandle<()>, Arc<ErrorPublisherStats>)>,
    listener_stats: Arc<ListenerStats>,
    subscriber_stats: Arc<SubscriberStats>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("store", &self.store.provider_name())
            .field("messaging", &self.messaging.provider_name())
            .field("grpc_addr", &self.grpc.as_ref().map(GrpcServerHandle::local_addr))
            .finish()
    }
}

impl ServiceHandle {
    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc.as_ref().map(GrpcServerHandle::local_addr)
    }

    pub fn store(&self) -> &Arc<dyn StoreService> {
        &self.store
    }

    pub fn messaging(&self) -> &Arc<MessagingProvider> {
        &self.messaging
    }

    pub fn listener_stats(&self) -> Arc<ListenerStats> {
        self.listener_stats.clone()
    }

    pub fn subscriber_stats(&self) -> Arc<SubscriberStats> {
        self.subscriber_stats.clone()
    }

    pub fn publisher_stats(&self) -> Option<Arc<ErrorPublisherStats>> {
        self.publisher.as_ref().map(|(_, stats)| stats.clone())
    }

    /// Ordered shutdown: subscriber, gRPC server, listener, publisher
    pub async fn shutdown(mut self) -> StatemachineResult<()> {
        info!("Shutting down statemachine service");

        let _ = self.subscriber_shutdown.send(true);
        self.subscriber
            .await
            .map_err(|e| StatemachineError::task("subscriber", e.to_string()))?;

        if let Some(grpc) = self.grpc.take() {
            grpc.stop().await?;
        }

        self.listener
            .await
            .map_err(|e| StatemachineError::task("listener", e.to_string()))?;

        if let Some((publisher, _)) = self.publisher.take() {
            publisher
                .await
                .map_err(|e| StatemachineError::task("error_publisher", e.to_string()))?;
        }

        info!(
            processed = self.listener_stats.received(),
            failed = self.listener_stats.failed(),
            "Statemachine service stopped"
        );
        Ok(())
    }
}
