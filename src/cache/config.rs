use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_CAPACITY: usize = 1024;

/// Runtime cache parameters derived from `[cache]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of cached paths before least-recently-read eviction.
    pub capacity: usize,
    /// Entries older than this behave as misses. `None` keeps them until evicted.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            ttl: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity,
            ttl: settings.ttl_seconds.map(Duration::from_secs),
        }
    }
}

impl CacheConfig {
    /// Capacity as `NonZeroUsize`, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.ttl, None);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }

    #[test]
    fn settings_ttl_is_converted_to_seconds() {
        let settings = CacheSettings {
            enabled: false,
            capacity: 16,
            ttl_seconds: Some(90),
        };
        let config = CacheConfig::from(&settings);

        assert!(!config.enabled);
        assert_eq!(config.capacity, 16);
        assert_eq!(config.ttl, Some(Duration::from_secs(90)));
    }
}
