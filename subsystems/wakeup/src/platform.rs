//! # Platform Collaborators
//!
//! The wakeup core does not own a clock, a timer wheel or a scheduler.
//! The embedding kernel hands them in through these traits.
//!
//! ```text
//! ┌──────────────┐   now()            ┌────────────┐
//! │              │ ─────────────────▶ │   Clock    │
//! │              │   setup/modify/    ├────────────┤
//! │ WakeupEvents │   cancel/release   │ TimerQueue │──▶ TimerHandler::expire()
//! │              │ ─────────────────▶ ├────────────┤
//! │              │   sleep()          │   Waiter   │
//! └──────────────┘ ─────────────────▶ └────────────┘
//! ```

use alloc::sync::{Arc, Weak};
use core::fmt;
use core::time::Duration;

use crate::time::{Clock, Timestamp};

// =============================================================================
// Deferred Callbacks
// =============================================================================

/// Identifier of a one-shot timer owned by a [`TimerQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Callback target of an expiring timer
pub trait TimerHandler: Send + Sync {
    /// Called from timer context once the deadline has passed
    fn expire(&self);
}

/// Deferred callback facility
///
/// Implementations must invoke handlers without holding any internal lock:
/// a handler may call back into `cancel` on its own timer.
pub trait TimerQueue: Send + Sync {
    /// Create an unarmed timer bound to `handler`
    fn setup(&self, handler: Weak<dyn TimerHandler>) -> TimerId;

    /// Arm or re-arm the timer to fire at `deadline`
    fn modify(&self, id: TimerId, deadline: Timestamp);

    /// Disarm the timer; returns whether it was pending
    fn cancel(&self, id: TimerId) -> bool;

    /// Disarm and forget the timer
    fn release(&self, id: TimerId);
}

// =============================================================================
// Blocking and Caller Context
// =============================================================================

/// Puts the calling context to sleep
pub trait Waiter: Send + Sync {
    /// Sleep for roughly `interval`
    fn sleep(&self, interval: Duration);
}

/// Facts about the calling task, consulted by `get_count`
pub trait TaskContext {
    /// Whether the caller holds administrative privilege
    fn is_admin(&self) -> bool;

    /// Whether a cancellation signal is pending for the caller
    fn signal_pending(&self) -> bool;
}

// =============================================================================
// Platform Bundle
// =============================================================================

/// Collaborators injected into [`crate::WakeupEvents`]
#[derive(Clone)]
pub struct Platform {
    /// Monotonic clock
    pub clock: Arc<dyn Clock>,
    /// Deferred deactivation timers
    pub timers: Arc<dyn TimerQueue>,
    /// Sleep facility for the polling loops
    pub waiter: Arc<dyn Waiter>,
}

impl Platform {
    /// Bundle the collaborators
    pub fn new(clock: Arc<dyn Clock>, timers: Arc<dyn TimerQueue>, waiter: Arc<dyn Waiter>) -> Self {
        Self {
            clock,
            timers,
            waiter,
        }
    }

    /// Current monotonic time
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}
