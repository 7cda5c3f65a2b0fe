//! # Time
//!
//! Monotonic timestamps and the clock collaborator.

use core::time::Duration;

// =============================================================================
// Timestamp
// =============================================================================

/// Monotonic time in nanoseconds since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    nanos: u64,
}

impl Timestamp {
    /// Boot time
    pub const ZERO: Timestamp = Timestamp { nanos: 0 };

    /// Create from nanoseconds
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Create from milliseconds
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Get nanoseconds
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Get milliseconds
    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    /// Elapsed time since an earlier timestamp (zero if `earlier` is later)
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }

    /// Timestamp `duration` after this one, clamped at the end of time
    pub fn saturating_add(&self, duration: Duration) -> Timestamp {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Timestamp {
            nanos: self.nanos.saturating_add(delta),
        }
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Monotonic clock collaborator
pub trait Clock: Send + Sync {
    /// Current monotonic time
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_units() {
        let ts = Timestamp::from_millis(1500);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert_eq!(ts.as_millis(), 1500);
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp::from_millis(10);
        let late = Timestamp::from_millis(35);
        assert_eq!(late.duration_since(early), Duration::from_millis(25));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn test_saturating_add() {
        let ts = Timestamp::from_millis(1).saturating_add(Duration::from_millis(2));
        assert_eq!(ts, Timestamp::from_millis(3));
        let end = Timestamp::from_nanos(u64::MAX - 1).saturating_add(Duration::from_secs(1));
        assert_eq!(end.as_nanos(), u64::MAX);
    }
}
