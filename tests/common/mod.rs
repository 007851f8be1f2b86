#![allow(dead_code)]

pub mod builders;
pub mod strategies;

pub use builders::*;

use std::future::Future;
use std::time::Duration;

use statemachine::config::{QueueBackend, ServiceConfig};

/// In-memory store and queues, ephemeral gRPC port, fast polling
pub fn test_service_config(dlq: Option<&str>) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.grpc.bind_address = "127.0.0.1:0".to_string();
    config.queues.backend = QueueBackend::InMemory;
    config.queues.events_queue = "fsm_events".to_string();
    config.queues.dlq = dlq.unwrap_or_default().to_string();
    config.queues.poll_interval_ms = 10;
    config
}

/// Poll `check` until it returns true or five seconds pass
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
