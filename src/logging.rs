//! # Structured Logging
//!
//! Console logging through `tracing-subscriber`. `RUST_LOG` takes precedence;
//! otherwise the configured verbosity picks the level. ANSI colors are used
//! only when stdout is a terminal.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LoggingConfig, Verbosity};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Filter from `RUST_LOG`, falling back to `verbosity`
pub fn build_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()))
}

/// Install the global subscriber. Later calls are no-ops, and an already
/// installed subscriber (e.g. from a test harness) is left in place.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INITIALIZED.get_or_init(|| {
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .boxed()
        };

        let filter = build_filter(config.verbosity);
        let subscriber = tracing_subscriber::registry().with(console_layer.with_filter(filter));

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
        } else {
            tracing::info!(
                verbosity = %config.verbosity,
                json = config.json,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&config);
        assert!(TRACING_INITIALIZED.get().is_some());
    }
}
