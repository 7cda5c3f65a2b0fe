//! # Wakeup Configuration
//!
//! Tunables for the blocking paths and diagnostics.

use core::time::Duration;

use crate::WAKEUP_POLL_INTERVAL_MS;

/// Wakeup framework configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeupConfig {
    /// Sleep between polls in `WakeupSource::destroy` and `get_count`
    pub poll_interval: Duration,
    /// Attribute negative quiescence answers to the active sources
    pub hit_counts_on_failure: bool,
}

impl WakeupConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(WAKEUP_POLL_INTERVAL_MS),
            hit_counts_on_failure: true,
        }
    }

    /// Set the poll interval
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable hit count attribution
    pub const fn with_hit_counts(mut self, enabled: bool) -> Self {
        self.hit_counts_on_failure = enabled;
        self
    }
}

impl Default for WakeupConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WakeupConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.hit_counts_on_failure);
    }

    #[test]
    fn test_builder() {
        let config = WakeupConfig::new()
            .with_poll_interval(Duration::from_millis(5))
            .with_hit_counts(false);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert!(!config.hit_counts_on_failure);
    }
}
