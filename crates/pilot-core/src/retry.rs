//! Bounded, fixed-delay retry of whole phases.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs;

/// Attempt bound and fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Pause between attempts (milliseconds).
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Attempt bound with the `>= 1` floor applied, for deserialized values.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sequentially.
///
/// `op` receives the 1-based attempt number. Between failed attempts the
/// executor logs the error and sleeps `policy.delay()`. Errors for which
/// [`PilotError::is_retryable`](crate::PilotError::is_retryable) is false are
/// returned at once. After the last attempt the final error is returned
/// unchanged.
pub async fn retry_with_policy<T, F, Fut>(phase: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(phase = %phase, attempt, "phase succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                debug!(phase = %phase, attempt, error = %err, "non-retryable error, giving up");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(phase = %phase, attempts = attempt, error = %err, "retry attempts exhausted");
                return Err(err);
            }
            Err(err) => {
                obs::emit_attempt_failed(phase, attempt, max_attempts, &err);
                METRICS.inc_phase_retries();
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
        }
    }
}
