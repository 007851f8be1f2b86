//! Messaging backends

pub mod in_memory;
pub mod pgmq;

pub use self::pgmq::PgmqMessagingService;
pub use in_memory::InMemoryMessagingService;
