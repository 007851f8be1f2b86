//! # System Constants
//!
//! Operational defaults and fixed identifiers shared across the store, the
//! worker and the gRPC surface.

use std::time::Duration;

/// Release tag reported by the `Health` RPC unless overridden in configuration
pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

/// Default per-call deadline for store primitives
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(200);

/// Default number of retries after a store deadline expires
pub const DEFAULT_STORE_MAX_RETRIES: u32 = 3;

/// Upper bound for the randomized backoff between store retries
pub const MAX_STORE_BACKOFF: Duration = Duration::from_millis(500);

/// Default number of optimistic transaction attempts in `process_event`
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 3;

/// TTL meaning "never expire" for events and outcomes
pub const NEVER_EXPIRE: Duration = Duration::ZERO;

/// Default number of acknowledgement attempts for ingress queue messages
pub const DEFAULT_ACK_RETRIES: u32 = 3;

/// Key layout for persisted entities
pub mod keys {
    /// Separates key components (`fsm:<cfg>`, `<name>:<version>`)
    pub const COMPONENT_SEPARATOR: char = ':';
    /// Separates a key prefix from an identifier (`configs#<id>`)
    pub const ID_SEPARATOR: char = '#';

    pub const CONFIGS_PREFIX: &str = "configs";
    pub const FSM_PREFIX: &str = "fsm";
    pub const EVENTS_PREFIX: &str = "events";
    pub const STATE_SEGMENT: &str = "state";
    pub const OUTCOME_SEGMENT: &str = "outcome";
}

/// Health states reported over gRPC
pub mod health {
    pub const SERVING: &str = "OK";
    pub const NOT_SERVING: &str = "NOT_SERVING";
}
