use std::time::Duration;

use crate::wake::MIN_WAKE_PERIOD;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub log_filter: String,
    /// Minimum spacing between two replicated writes.
    pub flush_interval: Duration,
    /// Period requested from the durable wake source. Never below the platform floor.
    pub wake_period: Duration,
    pub max_write_retries: u32,
    pub retry_delay: Duration,
    /// Per-item quota of the replicated store the binary wires up.
    pub item_quota_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,driftwood_coordinator=debug".into(),
            flush_interval: Duration::from_millis(2_000),
            wake_period: MIN_WAKE_PERIOD,
            max_write_retries: 3,
            retry_delay: Duration::from_millis(2_000),
            item_quota_bytes: 8_192,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let log_filter = lookup("RUST_LOG").unwrap_or(defaults.log_filter);
        let flush_interval = lookup("DRIFTWOOD_FLUSH_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.flush_interval);
        let wake_period = lookup("DRIFTWOOD_WAKE_PERIOD_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.wake_period)
            .max(MIN_WAKE_PERIOD);
        let max_write_retries = lookup("DRIFTWOOD_MAX_WRITE_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_write_retries);
        let retry_delay = lookup("DRIFTWOOD_RETRY_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);
        let item_quota_bytes = lookup("DRIFTWOOD_ITEM_QUOTA_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.item_quota_bytes);
        Self {
            log_filter,
            flush_interval,
            wake_period,
            max_write_retries,
            retry_delay,
            item_quota_bytes,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_retries(mut self, max_write_retries: u32, retry_delay: Duration) -> Self {
        self.max_write_retries = max_write_retries;
        self.retry_delay = retry_delay;
        self
    }
}
