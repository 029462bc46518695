use std::time::Duration;

use crate::tenancy::CacheConfig;

/// Tenancy-level configuration: connection lifecycle deadlines and the
/// background maintenance cadence.
#[derive(Debug, Clone)]
pub struct TenancyConfig {
    /// Upper bound on establishing one tenant connection, in milliseconds.
    pub creation_timeout_ms: u64,
    /// Upper bound on one health-probe ping, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Default deadline for bounded storage operations, in milliseconds.
    pub query_timeout_ms: u64,
    /// Ready connections unused for this long are evicted. Zero disables
    /// idle eviction.
    pub idle_timeout_ms: u64,
    /// Interval between reaper ticks (idle sweep plus health probe).
    pub reaper_interval_ms: u64,
    /// Prefix of derived storage locators (`<prefix><tenant_id>`).
    pub locator_prefix: String,
}

impl TenancyConfig {
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            creation_timeout: Duration::from_millis(self.creation_timeout_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// `None` when idle eviction is disabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            creation_timeout_ms: 10_000,
            probe_timeout_ms: 2_000,
            query_timeout_ms: 10_000,
            idle_timeout_ms: 30 * 60 * 1000,
            reaper_interval_ms: 60_000,
            locator_prefix: "tenant_".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_request_budget() {
        let config = TenancyConfig::default();
        assert_eq!(config.cache_config().creation_timeout, Duration::from_secs(10));
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn zero_idle_timeout_disables_eviction() {
        let config = TenancyConfig {
            idle_timeout_ms: 0,
            ..TenancyConfig::default()
        };
        assert!(config.idle_timeout().is_none());
    }
}
