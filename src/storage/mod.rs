//! # Store
//!
//! Persistence for configurations, instances, events and outcomes, the
//! state-indexed instance sets, and the atomic `process_event` transition.
//!
//! Two backends satisfy [`StoreService`]:
//!
//! - [`RedisStore`]: durable, optimistic WATCH/MULTI/EXEC transactions
//! - [`InMemoryStore`]: process-local, for tests and development
//!
//! [`connect`] picks one from [`StoreConfig`]: an empty endpoint selects the
//! in-memory store.

pub mod errors;
pub mod providers;
pub mod retry;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use errors::{EntityKind, StoreError, StoreResult};
pub use providers::{InMemoryStore, RedisStore};
pub use retry::RetryPolicy;
pub use traits::StoreService;

use crate::config::StoreConfig;

/// Build the store selected by `config`
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn StoreService>> {
    let store: Arc<dyn StoreService> = if config.is_in_memory() {
        let store = InMemoryStore::new();
        store.set_timeout(config.timeout());
        Arc::new(store)
    } else {
        Arc::new(RedisStore::from_config(config).await?)
    };

    info!(provider = store.provider_name(), "Store initialized");
    Ok(store)
}
