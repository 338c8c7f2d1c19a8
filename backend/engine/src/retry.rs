//! Retry policy: exponential backoff with optional jitter, applied only
//! to transient provider failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use callbridge_config::RetryConfig;
use callbridge_core::CallError;

/// Whether and when to retry a failed adapter or gateway operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts in total, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// ±25% random jitter to avoid synchronized retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            backoff_factor: config.backoff_factor,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Decide the fate of an operation that has failed `attempts_made`
    /// times (1-indexed: the first failure is attempt 1). Permanent
    /// error classes are never retried.
    pub fn decide(&self, error: &CallError, attempts_made: u32) -> RetryDecision {
        if !error.is_transient() || attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempts_made),
        }
    }

    /// Backoff before the attempt following failure number
    /// `attempts_made`: `base * factor^(n-1)`, capped at the maximum.
    fn delay_for(&self, attempts_made: u32) -> Duration {
        let raw = self.base_delay_ms as f64
            * self.backoff_factor.powi(attempts_made.saturating_sub(1) as i32);
        let mut delay_ms = raw.min(self.max_delay_ms as f64) as u64;
        if self.jitter {
            let spread = delay_ms / 4;
            if spread > 0 {
                let offset = (xorshift() % (spread * 2)) as i64 - spread as i64;
                delay_ms = (delay_ms as i64 + offset).max(0) as u64;
            }
        }
        Duration::from_millis(delay_ms)
    }
}

/// Dependency-free jitter source.
fn xorshift() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEED: AtomicU64 = AtomicU64::new(0x9e3779b97f4a7c15);
    let mut x = SEED.load(Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    SEED.store(x, Ordering::Relaxed);
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 1_000,
            jitter: false,
        }
    }

    fn transient() -> CallError {
        CallError::ProviderUnavailable("502".into())
    }

    #[test]
    fn retries_transient_until_attempts_exhausted() {
        let policy = policy();
        assert!(matches!(
            policy.decide(&transient(), 1),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(&transient(), 2),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(&transient(), 3), RetryDecision::GiveUp);
    }

    #[test]
    fn never_retries_permanent_classes() {
        let policy = policy();
        for error in [
            CallError::ProviderAuth("bad key".into()),
            CallError::ProviderQuota {
                quota: "characters".into(),
                message: "exhausted".into(),
            },
            CallError::ProviderValidation("unknown voice".into()),
            CallError::Telephony("rejected".into()),
            CallError::Timeout("deadline".into()),
        ] {
            assert_eq!(policy.decide(&error, 1), RetryDecision::GiveUp, "{error}");
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut policy = policy();
        policy.jitter = true;
        for _ in 0..100 {
            let delay = policy.delay_for(2).as_millis() as u64;
            assert!((150..=250).contains(&delay), "jittered delay {delay}");
        }
    }
}
