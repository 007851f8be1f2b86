//! # In-Memory Store
//!
//! Mirrors the Redis keyspace in process memory: records are held in their
//! binary encoding under the same keys, sets are sorted. `process_event`
//! runs under a single write lock, which gives it the same all-or-nothing
//! behavior as the optimistic Redis transaction.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::codec::BinaryRecord;
use crate::config::Verbosity;
use crate::keyspace;
use crate::models::{Configuration, Event, EventOutcome, FiniteStateMachine};
use crate::state_machine;
use crate::storage::errors::{EntityKind, StoreError, StoreResult};
use crate::storage::traits::StoreService;

#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    values: HashMap<String, StoredValue>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl Keyspace {
    fn get(&self, key: &str) -> Option<&[u8]> {
        let now = Instant::now();
        self.values
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.bytes.as_slice())
    }

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn set(&mut self, key: String, bytes: Vec<u8>, ttl: Duration) {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.values.insert(key, StoredValue { bytes, expires_at });
    }

    fn members(&self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn add_member(&mut self, key: String, member: &str) {
        self.sets.entry(key).or_default().insert(member.to_string());
    }

    fn remove_member(&mut self, key: &str, member: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.sets.remove(key);
            }
        }
    }

    fn move_member(&mut self, cfg_name: &str, id: &str, old_state: &str, new_state: &str) {
        if !old_state.is_empty() {
            self.remove_member(&keyspace::fsm_state_key(cfg_name, old_state), id);
        }
        if !new_state.is_empty() {
            self.add_member(keyspace::fsm_state_key(cfg_name, new_state), id);
        }
    }

    fn decode<T: BinaryRecord>(&self, entity: EntityKind, key: &str) -> StoreResult<T> {
        let bytes = self
            .get(key)
            .ok_or_else(|| StoreError::not_found(entity, key))?;
        Ok(T::decode_binary(bytes)?)
    }
}

/// Process-local store for tests and single-node development
#[derive(Debug)]
pub struct InMemoryStore {
    keyspace: RwLock<Keyspace>,
    timeout: RwLock<Duration>,
    verbosity: RwLock<Verbosity>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            timeout: RwLock::new(crate::constants::DEFAULT_STORE_TIMEOUT),
            verbosity: RwLock::new(Verbosity::default()),
        }
    }

    /// Current per-call deadline. Calls never block, so it is informational.
    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    /// Number of live records (for testing)
    pub fn record_count(&self) -> usize {
        let now = Instant::now();
        self.keyspace
            .read()
            .values
            .values()
            .filter(|v| v.is_live(now))
            .count()
    }

    fn log_op(&self, operation: &'static str, key: &str) {
        if *self.verbosity.read() >= Verbosity::Verbose {
            debug!(operation, key, provider = "in_memory", "Store operation");
        }
    }
}

#[async_trait]
impl StoreService for InMemoryStore {
    async fn get_config(&self, version_id: &str) -> StoreResult<Configuration> {
        let key = keyspace::config_key(version_id);
        self.log_op("get_config", &key);
        self.keyspace.read().decode(EntityKind::Configuration, &key)
    }

    async fn put_config(&self, config: &Configuration) -> StoreResult<()> {
        let version_id = config.version_id();
        let key = keyspace::config_key(&version_id);
        self.log_op("put_config", &key);

        let mut ks = self.keyspace.write();
        if ks.contains(&key) {
            return Err(StoreError::already_exists(EntityKind::Configuration, version_id));
        }
        ks.set(key, config.encode_binary(), Duration::ZERO);
        ks.add_member(keyspace::configs_set_key(), &config.name);
        ks.add_member(keyspace::config_versions_key(&config.name), &version_id);
        Ok(())
    }

    async fn get_instance(&self, id: &str, cfg_name: &str) -> StoreResult<FiniteStateMachine> {
        let key = keyspace::fsm_key(cfg_name, id);
        self.log_op("get_instance", &key);
        self.keyspace.read().decode(EntityKind::Fsm, &key)
    }

    async fn put_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()> {
        let key = keyspace::fsm_key(fsm.config_name(), id);
        self.log_op("put_instance", &key);
        self.keyspace
            .write()
            .set(key, fsm.encode_binary(), Duration::ZERO);
        Ok(())
    }

    async fn create_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()> {
        let cfg_name = fsm.config_name();
        let key = keyspace::fsm_key(cfg_name, id);
        self.log_op("create_instance", &key);

        let mut ks = self.keyspace.write();
        if ks.contains(&key) {
            return Err(StoreError::already_exists(EntityKind::Fsm, key));
        }
        ks.set(key, fsm.encode_binary(), Duration::ZERO);
        ks.add_member(keyspace::fsm_state_key(cfg_name, &fsm.state), id);
        Ok(())
    }

    async fn get_event(&self, event_id: &str, cfg_name: &str) -> StoreResult<Event> {
        let key = keyspace::event_key(cfg_name, event_id);
        self.log_op("get_event", &key);
        self.keyspace.read().decode(EntityKind::Event, &key)
    }

    async fn put_event(&self, event: &Event, cfg_name: &str, ttl: Duration) -> StoreResult<()> {
        let key = keyspace::event_key(cfg_name, event.id());
        self.log_op("put_event", &key);
        self.keyspace.write().set(key, event.encode_binary(), ttl);
        Ok(())
    }

    async fn add_outcome(
        &self,
        event_id: &str,
        cfg_name: &str,
        outcome: &EventOutcome,
        ttl: Duration,
    ) -> StoreResult<()> {
        let key = keyspace::outcome_key(cfg_name, event_id);
        self.log_op("add_outcome", &key);
        self.keyspace.write().set(key, outcome.encode_binary(), ttl);
        Ok(())
    }

    async fn get_outcome(&self, event_id: &str, cfg_name: &str) -> StoreResult<EventOutcome> {
        let key = keyspace::outcome_key(cfg_name, event_id);
        self.log_op("get_outcome", &key);
        self.keyspace.read().decode(EntityKind::Outcome, &key)
    }

    async fn list_config_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.keyspace.read().members(&keyspace::configs_set_key()))
    }

    async fn list_versions(&self, name: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keyspace
            .read()
            .members(&keyspace::config_versions_key(name)))
    }

    async fn list_instances_in_state(
        &self,
        cfg_name: &str,
        state: &str,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .keyspace
            .read()
            .members(&keyspace::fsm_state_key(cfg_name, state)))
    }

    async fn update_state(
        &self,
        cfg_name: &str,
        id: &str,
        old_state: &str,
        new_state: &str,
    ) -> StoreResult<()> {
        self.log_op("update_state", id);
        self.keyspace
            .write()
            .move_member(cfg_name, id, old_state, new_state);
        Ok(())
    }

    async fn process_event(
        &self,
        id: &str,
        cfg_name: &str,
        event: &Event,
    ) -> StoreResult<FiniteStateMachine> {
        let fsm_key = keyspace::fsm_key(cfg_name, id);
        self.log_op("process_event", &fsm_key);

        let mut ks = self.keyspace.write();
        let mut fsm: FiniteStateMachine = ks.decode(EntityKind::Fsm, &fsm_key)?;
        let config: Configuration =
            ks.decode(EntityKind::Configuration, &keyspace::config_key(&fsm.config_id))?;

        let old_state = fsm.state.clone();
        state_machine::apply(&mut fsm, &config, event)?;

        ks.set(fsm_key, fsm.encode_binary(), Duration::ZERO);
        ks.move_member(cfg_name, id, &old_state, &fsm.state);
        Ok(fsm)
    }

    async fn health(&self) -> StoreResult<()> {
        Ok(())
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    fn set_log_verbosity(&self, verbosity: Verbosity) {
        *self.verbosity.write() = verbosity;
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
