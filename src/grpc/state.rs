//! Shared state for the gRPC service.

use std::sync::Arc;

use crate::events::EventSender;
use crate::storage::StoreService;

/// Handles the RPC handlers share: the store and the ingress channel.
#[derive(Clone, Debug)]
pub struct GrpcState {
    pub store: Arc<dyn StoreService>,
    pub events: EventSender,
    /// Release tag reported by `Health`
    pub release: String,
    pub tls_enabled: bool,
}

impl GrpcState {
    pub fn new(
        store: Arc<dyn StoreService>,
        events: EventSender,
        release: impl Into<String>,
    ) -> Self {
        Self {
            store,
            events,
            release: release.into(),
            tls_enabled: false,
        }
    }

    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }
}
