// Retry policy for queued jobs

use tracing::warn;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job (with backoff delay in ms)
    Retry(i64),
    /// Do not retry, attempts are exhausted
    Exhausted,
}

/// Exponential backoff policy applied to transient job failures.
///
/// delay = base_delay * 2^attempts, so with the defaults the delays are
/// 500, 1000, 2000 ms for attempts 0..3.
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay_ms: i64,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_BASE_DELAY_MS: i64 = 500;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: i32, base_delay_ms: i64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Decide whether a job that has already made `attempts` tries (the
    /// failing one included) gets another delivery.
    pub fn should_retry(&self, job_id: &str, attempts: i32) -> RetryDecision {
        if attempts >= self.max_attempts {
            warn!(
                job_id = %job_id,
                attempts = %attempts,
                max_attempts = %self.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry(self.delay_for(attempts))
    }

    /// Backoff delay for the next delivery after `attempts` tries.
    pub fn delay_for(&self, attempts: i32) -> i64 {
        let exponent = attempts.max(1) - 1;
        self.base_delay_ms * (1_i64 << exponent.min(30))
    }
}
