use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::errors::Result;
use crate::health::HealthTracker;
use crate::models::call_result::CallResult;

/// Attempt budget and backoff curve for one logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. 0 behaves like 1.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait before attempt `attempt` (1-based): nothing before the first,
    /// then `base * multiplier^(attempt - 2)`, capped at `max_delay_ms`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

/// One finished attempt and the time spent in the remote call itself.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub result: CallResult,
    pub elapsed: Duration,
}

impl Attempt {
    /// Await `call` and time it. Start this only once the attempt may
    /// actually go out, so queueing ahead of it is not counted.
    pub async fn timed<Fut>(call: Fut) -> Result<Self>
    where
        Fut: Future<Output = Result<CallResult>>,
    {
        let started = Instant::now();
        let result = call.await?;
        Ok(Self {
            result,
            elapsed: started.elapsed(),
        })
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent, and return the last result.
///
/// `operation` receives the 1-based attempt number and reports its own
/// duration through [`Attempt`]. Every attempt is recorded in `tracker`. An
/// `Err` from `operation` is a configuration problem and is returned at once
/// without retrying.
pub async fn execute<F, Fut>(
    policy: &RetryPolicy,
    tracker: &HealthTracker,
    mut operation: F,
) -> Result<CallResult>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        let Attempt { result, elapsed } = operation(attempt).await?;
        tracker.record(&result, elapsed.as_secs_f64() * 1000.0);

        if result.success || !result.is_retryable() {
            if !result.success {
                debug!(
                    attempt,
                    outcome = result.outcome(),
                    status = ?result.status_code,
                    "non-retryable webhook failure"
                );
            }
            return Ok(result);
        }

        if attempt >= max_attempts {
            warn!(
                attempts = attempt,
                outcome = result.outcome(),
                error = ?result.error,
                "webhook retry budget exhausted"
            );
            return Ok(result);
        }

        attempt += 1;
        let wait = policy.delay_before(attempt);
        warn!(
            attempt = attempt - 1,
            max_attempts,
            outcome = result.outcome(),
            "webhook attempt failed, retrying in {:?}",
            wait
        );
        sleep(wait).await;
    }
}
