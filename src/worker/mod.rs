//! # Worker
//!
//! Background tasks around the event channel:
//!
//! - [`QueueSubscriber`] feeds ingress queue messages into the channel
//! - [`EventListener`] drains the channel through the store
//! - [`ErrorPublisher`] forwards failure outcomes to the DLQ

pub mod error_publisher;
pub mod listener;
pub mod subscriber;

pub use error_publisher::{ErrorPublisher, ErrorPublisherStats};
pub use listener::{outcome_code, EventListener, ListenerStats};
pub use subscriber::{QueueSubscriber, SubscriberConfig, SubscriberStats};
