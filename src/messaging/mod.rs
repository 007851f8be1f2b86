//! # Messaging
//!
//! Queue access for the event subscriber and the error publisher.
//!
//! - [`MessagingService`]: provider-agnostic queue operations over JSON payloads
//! - [`MessagingProvider`]: enum dispatch over the pgmq and in-memory backends

pub mod errors;
pub mod provider;
pub mod providers;
pub mod traits;
pub mod types;

pub use errors::MessagingError;
pub use provider::MessagingProvider;
pub use providers::{InMemoryMessagingService, PgmqMessagingService};
pub use traits::MessagingService;
pub use types::{MessageId, QueuedMessage};
