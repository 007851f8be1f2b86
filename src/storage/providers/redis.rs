//! # Redis Store
//!
//! Durable store backed by Redis. Primitive calls share a
//! `redis::aio::ConnectionManager` (multiplexed, reconnecting) and run under
//! the [`RetryPolicy`] deadline. `process_event` is an optimistic
//! WATCH/MULTI/EXEC transaction. WATCH state is per connection, so each
//! transaction checks out a dedicated connection from a small idle pool.
//!
//! Only the reads of a transaction are retried. EXEC, like the instance
//! creation script, is sent once through [`commit_once`].
//!
//! Configurations are immutable once stored, so reads are cached per
//! `version_id`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{RedisError, Script};
use tracing::{debug, info};

use crate::codec::BinaryRecord;
use crate::config::{StoreConfig, Verbosity};
use crate::keyspace;
use crate::models::{Configuration, Event, EventOutcome, FiniteStateMachine};
use crate::state_machine;
use crate::storage::errors::{EntityKind, StoreError, StoreResult};
use crate::storage::retry::{commit_once, with_retry, RetryPolicy};
use crate::storage::traits::StoreService;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle transaction connections kept for reuse
const MAX_IDLE_TRANSACTION_CONNECTIONS: usize = 8;

/// Write the instance unless its key exists, then index it in its state set
const CREATE_INSTANCE_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  redis.call('SADD', KEYS[2], ARGV[2])
  return 1
end
return 0
"#;

/// Map a Redis error, classifying network hiccups as transient
fn map_redis_error(operation: &'static str, err: RedisError) -> StoreError {
    if err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::transient(operation, err.to_string())
    } else {
        StoreError::backend(operation, err.to_string())
    }
}

/// Accept both `host:port` and full `redis://` URLs
fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("redis://{endpoint}")
    }
}

/// Redact credentials from a Redis URL for logging
fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let prefix = &url[..=colon_pos];
            let suffix = &url[at_pos..];
            return format!("{}***{}", prefix, suffix);
        }
    }
    url.to_string()
}

fn ttl_millis(ttl: Duration) -> Option<u64> {
    (!ttl.is_zero()).then(|| (ttl.as_millis() as u64).max(1))
}

/// Redis-backed [`StoreService`]
pub struct RedisStore {
    client: redis::Client,
    connection_manager: ConnectionManager,
    endpoint: String,
    policy: RwLock<RetryPolicy>,
    transaction_attempts: u32,
    config_cache: DashMap<String, Configuration>,
    verbosity: RwLock<Verbosity>,
    idle_transaction_connections: Mutex<Vec<MultiplexedConnection>>,
    create_instance_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &redact_url(&self.endpoint))
            .field("policy", &*self.policy.read())
            .field("transaction_attempts", &self.transaction_attempts)
            .field("cached_configs", &self.config_cache.len())
            .finish()
    }
}

impl RedisStore {
    /// Connect and verify the server answers PING
    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let endpoint = normalize_endpoint(&config.endpoint);
        let client = redis::Client::open(endpoint.as_str()).map_err(|e| {
            StoreError::connection(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager =
            tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| {
                    StoreError::connection(format!(
                        "Timed out connecting to Redis at {}",
                        redact_url(&endpoint)
                    ))
                })?
                .map_err(|e| StoreError::connection(format!("Failed to connect to Redis: {}", e)))?;

        let store = Self {
            client,
            connection_manager,
            policy: RwLock::new(RetryPolicy::from_config(config)),
            transaction_attempts: config.transaction_attempts.max(1),
            config_cache: DashMap::new(),
            verbosity: RwLock::new(Verbosity::default()),
            idle_transaction_connections: Mutex::new(Vec::new()),
            create_instance_script: Script::new(CREATE_INSTANCE_SCRIPT),
            endpoint,
        };

        store
            .health()
            .await
            .map_err(|e| StoreError::connection(format!("Redis health check failed: {}", e)))?;

        info!(url = %redact_url(&store.endpoint), "Redis store connected");
        Ok(store)
    }

    fn policy(&self) -> RetryPolicy {
        *self.policy.read()
    }

    fn log_op(&self, operation: &'static str, key: &str) {
        if *self.verbosity.read() >= Verbosity::Verbose {
            debug!(operation, key, provider = "redis", "Store operation");
        }
    }

    async fn get_bytes(&self, operation: &'static str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.log_op(operation, key);
        with_retry(self.policy(), operation, || async {
            let mut conn = self.connection_manager.clone();
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<Vec<u8>>>(&mut conn)
                .await
                .map_err(|e| map_redis_error(operation, e))
        })
        .await
    }

    async fn get_record<T: BinaryRecord>(
        &self,
        operation: &'static str,
        entity: EntityKind,
        key: &str,
    ) -> StoreResult<T> {
        let bytes = self
            .get_bytes(operation, key)
            .await?
            .ok_or_else(|| StoreError::not_found(entity, key))?;
        Ok(T::decode_binary(&bytes)?)
    }

    async fn set_bytes(
        &self,
        operation: &'static str,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.log_op(operation, key);
        let ttl_ms = ttl_millis(ttl);
        with_retry(self.policy(), operation, || async {
            let mut conn = self.connection_manager.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(bytes.as_slice());
            if let Some(ms) = ttl_ms {
                cmd.arg("PX").arg(ms);
            }
            cmd.query_async::<()>(&mut conn)
                .await
                .map_err(|e| map_redis_error(operation, e))
        })
        .await
    }

    async fn members(&self, operation: &'static str, key: &str) -> StoreResult<Vec<String>> {
        self.log_op(operation, key);
        let mut members = with_retry(self.policy(), operation, || async {
            let mut conn = self.connection_manager.clone();
            redis::cmd("SMEMBERS")
                .arg(key)
                .query_async::<Vec<String>>(&mut conn)
                .await
                .map_err(|e| map_redis_error(operation, e))
        })
        .await?;
        members.sort();
        Ok(members)
    }

    /// Reuse an idle transaction connection or open a new one
    async fn checkout(&self, operation: &'static str) -> StoreResult<MultiplexedConnection> {
        let idle = self.idle_transaction_connections.lock().pop();
        match idle {
            Some(conn) => Ok(conn),
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| map_redis_error(operation, e)),
        }
    }

    /// Return a connection whose WATCH state has been cleared by EXEC
    fn checkin(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle_transaction_connections.lock();
        if idle.len() < MAX_IDLE_TRANSACTION_CONNECTIONS {
            idle.push(conn);
        }
    }

    /// Clear a pending WATCH and return the connection to the idle list
    async fn unwatch(&self, mut conn: MultiplexedConnection) {
        let cleared = redis::cmd("UNWATCH")
            .query_async::<()>(&mut conn)
            .await
            .is_ok();
        if cleared {
            self.checkin(conn);
        }
    }

    /// Decode the watched instance and evaluate `event` against it
    async fn stage_transition(
        &self,
        fsm_key: &str,
        raw: Option<Vec<u8>>,
        event: &Event,
    ) -> StoreResult<(FiniteStateMachine, String)> {
        let Some(raw) = raw else {
            return Err(StoreError::not_found(EntityKind::Fsm, fsm_key));
        };
        let mut fsm = FiniteStateMachine::decode_binary(&raw)?;
        let config = self.get_config(&fsm.config_id).await?;
        let old_state = fsm.state.clone();
        state_machine::apply(&mut fsm, &config, event)?;
        Ok((fsm, old_state))
    }

    /// WATCH `fsm_key` on a dedicated connection and read it
    async fn watch_instance(
        &self,
        fsm_key: &str,
    ) -> StoreResult<(MultiplexedConnection, Option<Vec<u8>>)> {
        const OP: &str = "process_event";
        let mut conn = self.checkout(OP).await?;

        redis::cmd("WATCH")
            .arg(fsm_key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error(OP, e))?;

        let raw = redis::cmd("GET")
            .arg(fsm_key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| map_redis_error(OP, e))?;
        Ok((conn, raw))
    }

    /// One optimistic attempt. `Ok(None)` means EXEC was aborted by a
    /// concurrent write to the watched instance key.
    async fn try_transition(
        &self,
        id: &str,
        cfg_name: &str,
        event: &Event,
    ) -> StoreResult<Option<FiniteStateMachine>> {
        const OP: &str = "process_event";
        let policy = self.policy();
        let fsm_key = keyspace::fsm_key(cfg_name, id);

        let (mut conn, raw) = with_retry(policy, OP, || self.watch_instance(&fsm_key)).await?;
        let (fsm, old_state) = match self.stage_transition(&fsm_key, raw, event).await {
            Ok(staged) => staged,
            Err(e) => {
                self.unwatch(conn).await;
                return Err(e);
            }
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&fsm_key)
            .arg(fsm.encode_binary())
            .ignore()
            .cmd("SREM")
            .arg(keyspace::fsm_state_key(cfg_name, &old_state))
            .arg(id)
            .cmd("SADD")
            .arg(keyspace::fsm_state_key(cfg_name, &fsm.state))
            .arg(id);

        let committed: Option<(i64, i64)> = commit_once(policy.timeout, &fsm_key, async {
            pipe.query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(OP, e))
        })
        .await?;

        self.checkin(conn);
        Ok(committed.map(|_| fsm))
    }
}

#[async_trait]
impl StoreService for RedisStore {
    async fn get_config(&self, version_id: &str) -> StoreResult<Configuration> {
        if let Some(cached) = self.config_cache.get(version_id) {
            return Ok(cached.clone());
        }
        let config: Configuration = self
            .get_record(
                "get_config",
                EntityKind::Configuration,
                &keyspace::config_key(version_id),
            )
            .await?;
        self.config_cache
            .insert(version_id.to_string(), config.clone());
        Ok(config)
    }

    async fn put_config(&self, config: &Configuration) -> StoreResult<()> {
        const OP: &str = "put_config";
        let version_id = config.version_id();
        let key = keyspace::config_key(&version_id);
        let bytes = config.encode_binary();
        self.log_op(OP, &key);

        // SET NX and both index writes commit together; the SADDs are
        // idempotent when the SET loses.
        let (created, _, _): (Option<String>, i64, i64) =
            with_retry(self.policy(), OP, || async {
                let mut conn = self.connection_manager.clone();
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(&key)
                    .arg(bytes.as_slice())
                    .arg("NX")
                    .cmd("SADD")
                    .arg(keyspace::configs_set_key())
                    .arg(&config.name)
                    .cmd("SADD")
                    .arg(keyspace::config_versions_key(&config.name))
                    .arg(&version_id)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| map_redis_error(OP, e))
            })
            .await?;

        if created.is_none() {
            return Err(StoreError::already_exists(
                EntityKind::Configuration,
                version_id,
            ));
        }
        Ok(())
    }

    async fn get_instance(&self, id: &str, cfg_name: &str) -> StoreResult<FiniteStateMachine> {
        self.get_record("get_instance", EntityKind::Fsm, &keyspace::fsm_key(cfg_name, id))
            .await
    }

    async fn put_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()> {
        self.set_bytes(
            "put_instance",
            &keyspace::fsm_key(fsm.config_name(), id),
            fsm.encode_binary(),
            Duration::ZERO,
        )
        .await
    }

    async fn create_instance(&self, id: &str, fsm: &FiniteStateMachine) -> StoreResult<()> {
        const OP: &str = "create_instance";
        let cfg_name = fsm.config_name();
        let fsm_key = keyspace::fsm_key(cfg_name, id);
        self.log_op(OP, &fsm_key);

        let mut conn = self.connection_manager.clone();
        let mut invocation = self.create_instance_script.prepare_invoke();
        invocation
            .key(&fsm_key)
            .key(keyspace::fsm_state_key(cfg_name, &fsm.state))
            .arg(fsm.encode_binary())
            .arg(id);

        let created: i64 = commit_once(self.policy().timeout, &fsm_key, async {
            invocation
                .invoke_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(OP, e))
        })
        .await?;

        if created == 0 {
            return Err(StoreError::already_exists(EntityKind::Fsm, fsm_key));
        }
        Ok(())
    }

    async fn get_event(&self, event_id: &str, cfg_name: &str) -> StoreResult<Event> {
        self.get_record(
            "get_event",
            EntityKind::Event,
            &keyspace::event_key(cfg_name, event_id),
        )
        .await
    }

    async fn put_event(&self, event: &Event, cfg_name: &str, ttl: Duration) -> StoreResult<()> {
        self.set_bytes(
            "put_event",
            &keyspace::event_key(cfg_name, event.id()),
            event.encode_binary(),
            ttl,
        )
        .await
    }

    async fn add_outcome(
        &self,
        event_id: &str,
        cfg_name: &str,
        outcome: &EventOutcome,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.set_bytes(
            "add_outcome",
            &keyspace::outcome_key(cfg_name, event_id),
            outcome.encode_binary(),
            ttl,
        )
        .await
    }

    async fn get_outcome(&self, event_id: &str, cfg_name: &str) -> StoreResult<EventOutcome> {
        self.get_record(
            "get_outcome",
            EntityKind::Outcome,
            &keyspace::outcome_key(cfg_name, event_id),
        )
        .await
    }

    async fn list_config_names(&self) -> StoreResult<Vec<String>> {
        self.members("list_config_names", &keyspace::configs_set_key())
            .await
    }

    async fn list_versions(&self, name: &str) -> StoreResult<Vec<String>> {
        self.members("list_versions", &keyspace::config_versions_key(name))
            .await
    }

    async fn list_instances_in_state(
        &self,
        cfg_name: &str,
        state: &str,
    ) -> StoreResult<Vec<String>> {
        self.members(
            "list_instances_in_state",
            &keyspace::fsm_state_key(cfg_name, state),
        )
        .await
    }

    async fn update_state(
        &self,
        cfg_name: &str,
        id: &str,
        old_state: &str,
        new_state: &str,
    ) -> StoreResult<()> {
        const OP: &str = "update_state";
        if old_state.is_empty() && new_state.is_empty() {
            return Ok(());
        }
        self.log_op(OP, id);

        with_retry(self.policy(), OP, || async {
            let mut conn = self.connection_manager.clone();
            let mut pipe = redis::pipe();
            pipe.atomic();
            if !old_state.is_empty() {
                pipe.cmd("SREM")
                    .arg(keyspace::fsm_state_key(cfg_name, old_state))
                    .arg(id)
                    .ignore();
            }
            if !new_state.is_empty() {
                pipe.cmd("SADD")
                    .arg(keyspace::fsm_state_key(cfg_name, new_state))
                    .arg(id)
                    .ignore();
            }
            pipe.query_async::<()>(&mut conn)
                .await
                .map_err(|e| map_redis_error(OP, e))
        })
        .await
    }

    async fn process_event(
        &self,
        id: &str,
        cfg_name: &str,
        event: &Event,
    ) -> StoreResult<FiniteStateMachine> {
        self.log_op("process_event", id);

        for attempt in 1..=self.transaction_attempts {
            match self.try_transition(id, cfg_name, event).await? {
                Some(fsm) => return Ok(fsm),
                None => debug!(
                    id,
                    cfg_name,
                    attempt,
                    "Instance modified concurrently, retrying transaction"
                ),
            }
        }

        Err(StoreError::conflict(
            keyspace::fsm_key(cfg_name, id),
            self.transaction_attempts,
        ))
    }

    async fn health(&self) -> StoreResult<()> {
        const OP: &str = "health";
        let pong: String = with_retry(self.policy(), OP, || async {
            let mut conn = self.connection_manager.clone();
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| map_redis_error(OP, e))
        })
        .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::backend(OP, format!("unexpected PING reply: {pong}")))
        }
    }

    fn set_timeout(&self, timeout: Duration) {
        self.policy.write().timeout = timeout;
    }

    fn set_log_verbosity(&self, verbosity: Verbosity) {
        *self.verbosity.write() = verbosity;
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
