//! # Store Service Trait
//!
//! The capability set every store backend provides. The service selects one
//! implementation at startup and shares it as `Arc<dyn StoreService>`.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::StoreResult;
use crate::config::Verbosity;
use crate::models::{Configuration, Event, EventOutcome, FiniteStateMachine};

#[async_trait]
pub trait StoreService: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a configuration by `version_id`
    async fn get_config(&self, version_id: &str) -> StoreResult<Configuration>;

    /// Store a new configuration and index its name and `version_id`.
    ///
    /// Fails with `AlreadyExists` when the `version_id` is taken.
    async fn put_config(&self, config: &Configuration) -> StoreResult<()>;

    async fn get_instance(&self, id: &str, cfg_name: &str) -> StoreResult<FiniteStateMachine>;

    /// Overwrite an instance record. The state index is left untouched.
    async fn put_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()>;

    /// Store a new instance and add `id` to its state set as one commit.
    ///
    /// Fails with `AlreadyExists`, writing nothing, when `id` is taken.
    async fn create_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()>;

    async fn get_event(&self, event_id: &str, cfg_name: &str) -> StoreResult<Event>;

    /// Write an event keyed by its `event_id`. A zero `ttl` never expires.
    async fn put_event(&self, event: &Event, cfg_name: &str, ttl: Duration) -> StoreResult<()>;

    /// Write an outcome keyed by `event_id`. A zero `ttl` never expires.
    async fn add_outcome(
        &self,
        event_id: &str,
        cfg_name: &str,
        outcome: &EventOutcome,
        ttl: Duration,
    ) -> StoreResult<()>;

    async fn get_outcome(&self, event_id: &str, cfg_name: &str) -> StoreResult<EventOutcome>;

    /// Known configuration names, sorted
    async fn list_config_names(&self) -> StoreResult<Vec<String>>;

    /// Known `version_id`s for `name`, sorted
    async fn list_versions(&self, name: &str) -> StoreResult<Vec<String>>;

    /// Ids of `cfg_name` instances currently in `state`, sorted
    async fn list_instances_in_state(&self, cfg_name: &str, state: &str)
        -> StoreResult<Vec<String>>;

    /// Move `id` from `old_state`'s set to `new_state`'s set atomically.
    ///
    /// An empty `old_state` is a pure insertion, an empty `new_state` a pure
    /// removal.
    async fn update_state(
        &self,
        cfg_name: &str,
        id: &str,
        old_state: &str,
        new_state: &str,
    ) -> StoreResult<()>;

    /// Atomically apply `event` to instance `id`.
    ///
    /// Reads the instance and its configuration, evaluates the transition,
    /// then writes the instance back and moves it between state sets as one
    /// commit. Returns the updated instance. Nothing is written on failure.
    async fn process_event(
        &self,
        id: &str,
        cfg_name: &str,
        event: &Event,
    ) -> StoreResult<FiniteStateMachine>;

    async fn health(&self) -> StoreResult<()>;

    /// Replace the per-call deadline
    fn set_timeout(&self, timeout: Duration);

    fn set_log_verbosity(&self, verbosity: Verbosity);

    fn provider_name(&self) -> &'static str;
}
