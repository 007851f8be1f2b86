//! Deadline and retry discipline shared by the store providers.
//!
//! Every primitive call runs under [`RetryPolicy::timeout`]. An expired
//! deadline or a [`StoreError::Transient`] failure is retried up to
//! `max_retries` times after a random pause in `[0, max_backoff]`; the final
//! failure surfaces as [`StoreError::Timeout`]. Every other error, `NotFound`
//! included, is returned on the first occurrence.
//!
//! Writes that are not idempotent go through [`commit_once`] instead: one
//! attempt, and a lost reply surfaces as [`StoreError::CommitUnknown`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::errors::{StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: constants::DEFAULT_STORE_TIMEOUT,
            max_retries: constants::DEFAULT_STORE_MAX_RETRIES,
            max_backoff: constants::MAX_STORE_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            max_backoff: constants::MAX_STORE_BACKOFF,
        }
    }

    /// Random pause before the next attempt
    pub fn backoff(&self) -> Duration {
        self.max_backoff.mul_f64(fastrand::f64())
    }
}

/// Run `call` under the policy's deadline, retrying transient failures
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_transient() => return Err(err),
            Ok(Err(err)) => {
                debug!(operation, attempt, error = %err, "Transient store failure");
            }
            Err(_) => {
                debug!(
                    operation,
                    attempt,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "Store deadline expired"
                );
            }
        }

        if attempt > policy.max_retries {
            return Err(StoreError::timeout(operation, attempt));
        }
        tokio::time::sleep(policy.backoff()).await;
    }
}

/// Await a non-idempotent write exactly once under `deadline`.
///
/// An error or an expired deadline leaves the outcome on the server unknown,
/// so both become [`StoreError::CommitUnknown`] and are never retried.
pub async fn commit_once<T, Fut>(deadline: Duration, key: &str, commit: Fut) -> StoreResult<T>
where
    Fut: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(deadline, commit).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(StoreError::commit_unknown(key, err.to_string())),
        Err(_) => Err(StoreError::commit_unknown(
            key,
            format!("no reply within {}ms", deadline.as_millis()),
        )),
    }
}
