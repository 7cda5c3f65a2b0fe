//! # Quiescence Protocol
//!
//! How the suspend orchestrator uses the wakeup counters:
//!
//! ```text
//!  user space / orchestrator                   wakeup core
//!  ─────────────────────────                   ───────────
//!  count = get_count()          ──────────▶    wait until nothing in progress
//!  save_count(count)            ──────────▶    arm check if count unchanged
//!      ... freeze tasks, suspend devices ...
//!  check_events()               ──────────▶    false if anything happened
//!      ... point of no return ...
//! ```
//!
//! A false answer from `save_count` or `check_events` means a wakeup event
//! raced with the transition; the orchestrator aborts and retries.

use crate::context::WakeupEvents;
use crate::error::{WakeupError, WakeupResult};
use crate::platform::TaskContext;

/// Suspend gating state, guarded by the events lock
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CheckState {
    /// Abort transitions on new events
    pub(crate) enabled: bool,
    /// Event counter value saved by the orchestrator
    pub(crate) saved_count: u32,
}

impl CheckState {
    pub(crate) const fn new() -> Self {
        Self {
            enabled: false,
            saved_count: 0,
        }
    }
}

impl WakeupEvents {
    /// Save `count` as the reference for [`Self::check_events`]
    ///
    /// Succeeds, and arms the check, only if `count` equals the current
    /// event counter and no event is in progress. State is left unchanged
    /// otherwise.
    pub fn save_count(&self, count: u32) -> bool {
        let saved = {
            let mut check = self.check.lock();
            let snap = self.counters().snapshot();
            if snap.is_idle() && snap.event_count == count {
                check.saved_count = count;
                check.enabled = true;
                true
            } else {
                false
            }
        };

        log::debug!("wakeup: save_count({}) -> {}", count, saved);
        if !saved {
            self.attribute_failure();
        }
        saved
    }

    /// Whether the system is still quiescent since [`Self::save_count`]
    ///
    /// Always true while the check is not armed. A false answer disarms
    /// the check.
    pub fn check_events(&self) -> bool {
        let quiescent = {
            let mut check = self.check.lock();
            if check.enabled {
                let snap = self.counters().snapshot();
                let still = snap.is_idle() && snap.event_count == check.saved_count;
                check.enabled = still;
                still
            } else {
                true
            }
        };

        if !quiescent {
            log::debug!("wakeup: wakeup event detected, aborting transition");
            self.attribute_failure();
        }
        quiescent
    }

    /// Wait for in-progress events to finish and return the event counter
    ///
    /// A privileged caller disarms the check first. Polls at the configured
    /// interval until nothing is in progress or `task` has a signal
    /// pending. If cancelled with events still in progress the counter is
    /// returned inside [`WakeupError::Interrupted`].
    pub fn get_count(&self, task: &dyn TaskContext) -> WakeupResult<u32> {
        if task.is_admin() {
            self.disable_events_check();
        }

        let interval = self.core.config.poll_interval;
        while self.counters().events_in_progress() != 0 && !task.signal_pending() {
            self.update_hit_counts();
            self.core.platform.waiter.sleep(interval);
        }

        let snap = self.counters().snapshot();
        if snap.is_idle() {
            Ok(snap.event_count)
        } else {
            log::debug!(
                "wakeup: get_count interrupted, {} event(s) in progress",
                snap.events_in_progress
            );
            Err(WakeupError::Interrupted {
                count: snap.event_count,
            })
        }
    }

    /// Boolean form of [`Self::get_count`] for C-style callers
    ///
    /// `count` is written whether or not the wait was interrupted.
    pub fn get_count_into(&self, task: &dyn TaskContext, count: &mut u32) -> bool {
        match self.get_count(task) {
            Ok(value) => {
                *count = value;
                true
            },
            Err(WakeupError::Interrupted { count: value }) => {
                *count = value;
                false
            },
            Err(_) => false,
        }
    }

    /// Disarm the check without touching the saved count
    pub fn disable_events_check(&self) {
        self.check.lock().enabled = false;
    }

    /// Whether transitions abort on new wakeup events
    pub fn events_check_enabled(&self) -> bool {
        self.check.lock().enabled
    }

    /// Last saved event counter value
    pub fn saved_count(&self) -> u32 {
        self.check.lock().saved_count
    }

    /// Completed event windows
    pub fn event_count(&self) -> u32 {
        self.counters().event_count()
    }

    /// Open event windows
    pub fn events_in_progress(&self) -> u32 {
        self.counters().events_in_progress()
    }
}

// =============================================================================
// Tests
// =============================================================================
