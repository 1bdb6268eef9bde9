//! Failure ceiling and backoff configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue-level failure policy.
///
/// Has no `Default`. The ceiling and the backoff are deployment choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failures after which an item is removed. Values below 1 act as 1.
    pub max_failures: u32,
    /// Delay before a failed item becomes claimable again.
    pub backoff: BackoffPolicy,
}

impl QueueConfig {
    /// Creates a queue configuration.
    pub fn new(max_failures: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_failures,
            backoff,
        }
    }

    /// Sets the failure ceiling.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Effective ceiling.
    pub fn ceiling(&self) -> u32 {
        self.max_failures.max(1)
    }
}

/// Exponential backoff between failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor per additional failure.
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Exponential backoff doubling from `initial_delay` up to `max_delay`.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// The same delay after every failure.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Failed items are claimable again immediately.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay after the `failures`-th failure (1-indexed).
    pub fn delay_for_failure(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());

        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
