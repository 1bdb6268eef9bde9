//! Configuration for the push and pull runners.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`PushQueue`](crate::PushQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Maximum items processed per run across all mappings.
    pub global_limit: u32,
    /// Batch size for mappings without their own push limit.
    pub default_mapping_limit: u32,
    /// Lease held on claimed push items.
    #[serde(with = "duration_secs")]
    pub lease: Duration,
}

impl PushConfig {
    /// Creates a push configuration with default limits.
    pub fn new() -> Self {
        Self {
            global_limit: 10_000,
            default_mapping_limit: 50,
            lease: Duration::from_secs(300),
        }
    }

    /// Sets the global per-run limit.
    pub fn with_global_limit(mut self, limit: u32) -> Self {
        self.global_limit = limit;
        self
    }

    /// Sets the default per-mapping batch size.
    pub fn with_default_mapping_limit(mut self, limit: u32) -> Self {
        self.default_mapping_limit = limit;
        self
    }

    /// Sets the claim lease.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for [`PullQueue`](crate::PullQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Wall-clock budget for one drain pass. Zero means no limit.
    #[serde(with = "duration_secs")]
    pub time_limit: Duration,
    /// Lease held on each claimed pull item.
    #[serde(with = "duration_secs")]
    pub lease: Duration,
    /// Populate skips a mapping once the pull queue holds this many items.
    pub max_queue_size: usize,
    /// Row limit applied to every pull query.
    pub query_limit: Option<u32>,
}

impl PullConfig {
    /// Creates a pull configuration with a 30 second drain budget.
    pub fn new() -> Self {
        Self {
            time_limit: Duration::from_secs(30),
            lease: Duration::from_secs(60),
            max_queue_size: 100_000,
            query_limit: None,
        }
    }

    /// Sets the drain budget.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Sets the claim lease.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Sets the queue size cap.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the per-query row limit.
    pub fn with_query_limit(mut self, limit: u32) -> Self {
        self.query_limit = Some(limit);
        self
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self::new()
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
