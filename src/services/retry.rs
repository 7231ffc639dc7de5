use crate::workers::TransferError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

// Jitter band around the computed delay
const JITTER_RATIO: f64 = 0.1;

/// Exponential backoff before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(max)
}

/// Scale `delay` by `factor`, clamped to the jitter band.
pub fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    let factor = factor.clamp(1.0 - JITTER_RATIO, 1.0 + JITTER_RATIO);
    delay.mul_f64(factor)
}

/// Result of a retried operation together with how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, TransferError>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = backoff_delay(attempt, self.base_delay, self.max_delay);
        let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        apply_jitter(delay, factor)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// The closure receives the 1-based attempt number. Permanent errors are
    /// returned on the first occurrence without consuming retry budget.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    debug!(operation, attempt, error = %e, "Giving up");
                    return Attempted {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
