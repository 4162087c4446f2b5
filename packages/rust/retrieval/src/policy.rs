//! Retry policy and the sleep seam used between attempts.

use std::time::Duration;

use async_trait::async_trait;

use siteadvisor_shared::{BackoffKind, RetryConfig};

/// Delay schedule between rate-limited attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffSchedule {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `initial * 2^(retry - 1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// How many times to retry and how long to wait in between.
///
/// Pure value: it does no I/O and can be shared by any number of concurrent
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub schedule: BackoffSchedule,
}

impl RetryPolicy {
    /// Fixed-backoff policy.
    pub fn fixed(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            schedule: BackoffSchedule::Fixed(backoff),
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Total attempts, including the first one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        match self.schedule {
            BackoffSchedule::Fixed(delay) => delay,
            BackoffSchedule::Exponential { initial, max } => {
                let shift = retry.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let initial = Duration::from_millis(config.backoff_ms);
        let schedule = match config.schedule {
            BackoffKind::Fixed => BackoffSchedule::Fixed(initial),
            BackoffKind::Exponential => BackoffSchedule::Exponential {
                initial,
                max: Duration::from_millis(config.max_backoff_ms),
            },
        };
        Self {
            max_retries: config.max_retries,
            schedule,
        }
    }
}

/// Suspends the current unit of work between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper: suspends only the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_counts_attempts() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(500));
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(500));
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 6,
            schedule: BackoffSchedule::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(350),
            },
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn policy_from_config() {
        let config = RetryConfig {
            max_retries: 4,
            backoff_ms: 250,
            schedule: BackoffKind::Exponential,
            max_backoff_ms: 1_000,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.attempts(), 5);
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1_000));

        let default = RetryPolicy::default();
        assert_eq!(default, RetryPolicy::fixed(2, Duration::from_secs(2)));
    }

    #[test]
    fn no_retry_makes_one_attempt() {
        assert_eq!(RetryPolicy::no_retry().attempts(), 1);
    }
}
