//! # Error Handling
//!
//! Error type shared by every fallible wakeup entry point.
//!
//! | Error | Raised by | State change |
//! |-------|-----------|--------------|
//! | `InvalidArgument` | device enable/disable on a non wakeup-capable device | none |
//! | `AlreadyExists` | second attach to a device | first binding kept |
//! | `OutOfMemory` | source creation | nothing registered |
//! | `Interrupted` | `get_count` cancelled with events in flight | none |
//!
//! Races between explicit and timed deactivation are not errors; they are
//! absorbed inside the wakeup source.

use core::fmt;

// =============================================================================
// Errno Values
// =============================================================================

/// Interrupted system call
pub const EINTR: i32 = 4;
/// Out of memory
pub const ENOMEM: i32 = 12;
/// File exists
pub const EEXIST: i32 = 17;
/// Invalid argument
pub const EINVAL: i32 = 22;

// =============================================================================
// Wakeup Error
// =============================================================================

/// Errors reported by the wakeup events framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeupError {
    /// Device missing the wakeup-capable flag
    InvalidArgument,
    /// Device already has a wakeup source attached
    AlreadyExists,
    /// Allocation of a wakeup source failed
    OutOfMemory,
    /// Wait for in-progress events was cancelled
    Interrupted {
        /// Registered event counter at the time of cancellation
        count: u32,
    },
}

impl WakeupError {
    /// Negative errno for C-style callers
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument => -EINVAL,
            Self::AlreadyExists => -EEXIST,
            Self::OutOfMemory => -ENOMEM,
            Self::Interrupted { .. } => -EINTR,
        }
    }

    /// Short static description
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::AlreadyExists => "wakeup source already attached",
            Self::OutOfMemory => "out of memory",
            Self::Interrupted { .. } => "interrupted while wakeup events in progress",
        }
    }
}

impl fmt::Display for WakeupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted { count } => write!(f, "{} (event count {})", self.as_str(), count),
            _ => f.write_str(self.as_str()),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for WakeupError {}

/// Result type for wakeup operations
pub type WakeupResult<T> = Result<T, WakeupError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(WakeupError::InvalidArgument.errno(), -22);
        assert_eq!(WakeupError::AlreadyExists.errno(), -17);
        assert_eq!(WakeupError::OutOfMemory.errno(), -12);
        assert_eq!(WakeupError::Interrupted { count: 3 }.errno(), -4);
    }

    #[test]
    fn test_display_carries_count() {
        let text = std::format!("{}", WakeupError::Interrupted { count: 42 });
        assert!(text.contains("42"));
        assert_eq!(
            std::format!("{}", WakeupError::AlreadyExists),
            "wakeup source already attached"
        );
    }
}
