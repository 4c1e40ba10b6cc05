//! Page cache configuration.
//!
//! Controls whether rendered pages are cached, for how long, and how many
//! entries the in-memory backend keeps.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 60 * 60;
const DEFAULT_CAPACITY: usize = 512;

/// Page cache configuration from the `[cache]` settings section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store rendered pages. When off, every request renders.
    pub enabled: bool,
    /// Lifetime of a cached page in seconds.
    pub ttl_seconds: u64,
    /// Maximum pages held by the in-memory backend.
    pub capacity: usize,
    /// Serialize concurrent misses on the same key so only one renders.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECS,
            capacity: DEFAULT_CAPACITY,
            single_flight: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl.as_secs(),
            capacity: settings.capacity.get(),
            single_flight: settings.single_flight,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(config.single_flight);
        assert_eq!(config.ttl(), Duration::from_secs(3600));
        assert_eq!(config.capacity, 512);
    }

    #[test]
    fn capacity_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
