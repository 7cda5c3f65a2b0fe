//! # Global Event Counters
//!
//! Two counters shared by every wakeup source:
//!
//! - `event_count`: number of completed event windows
//! - `events_in_progress`: number of windows currently open
//!
//! Closing a window increments `event_count` before decrementing
//! `events_in_progress`, with a full fence in between. Readers load
//! `events_in_progress` first, so whoever sees it drop to zero also sees
//! the matching `event_count`.

use core::sync::atomic::{fence, AtomicU32, Ordering};

/// Consistent pair of counter values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Completed event windows
    pub event_count: u32,
    /// Open event windows
    pub events_in_progress: u32,
}

impl CounterSnapshot {
    /// No window open
    pub const fn is_idle(&self) -> bool {
        self.events_in_progress == 0
    }
}

/// Process-wide wakeup event counters
#[derive(Debug)]
pub struct EventCounters {
    event_count: AtomicU32,
    events_in_progress: AtomicU32,
}

impl EventCounters {
    /// Both counters at zero
    pub const fn new() -> Self {
        Self {
            event_count: AtomicU32::new(0),
            events_in_progress: AtomicU32::new(0),
        }
    }

    /// An event window was opened
    pub(crate) fn begin(&self) {
        self.events_in_progress.fetch_add(1, Ordering::SeqCst);
    }

    /// An event window was closed
    pub(crate) fn complete(&self) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        let previous = self.events_in_progress.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "events_in_progress underflow");
    }

    /// Completed event windows (wraps)
    pub fn event_count(&self) -> u32 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// Open event windows
    pub fn events_in_progress(&self) -> u32 {
        self.events_in_progress.load(Ordering::SeqCst)
    }

    /// Read both counters, in-progress first
    pub fn snapshot(&self) -> CounterSnapshot {
        let events_in_progress = self.events_in_progress();
        let event_count = self.event_count();
        CounterSnapshot {
            event_count,
            events_in_progress,
        }
    }
}

impl Default for EventCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_complete() {
        let counters = EventCounters::new();
        counters.begin();
        counters.begin();
        assert_eq!(counters.events_in_progress(), 2);
        assert_eq!(counters.event_count(), 0);

        counters.complete();
        let snap = counters.snapshot();
        assert_eq!(snap.event_count, 1);
        assert_eq!(snap.events_in_progress, 1);
        assert!(!snap.is_idle());

        counters.complete();
        assert!(counters.snapshot().is_idle());
        assert_eq!(counters.event_count(), 2);
    }

    #[test]
    fn test_idle_snapshot_sees_final_count() {
        use std::sync::atomic::AtomicU32;
        use std::sync::Arc;

        const WINDOWS: u32 = 100_000;

        let counters = Arc::new(EventCounters::new());
        // Number of windows whose `begin` has happened.
        let opened = Arc::new(AtomicU32::new(0));

        let writer = {
            let counters = Arc::clone(&counters);
            let opened = Arc::clone(&opened);
            std::thread::spawn(move || {
                for i in 1..=WINDOWS {
                    counters.begin();
                    opened.store(i, Ordering::SeqCst);
                    counters.complete();
                }
            })
        };

        while !writer.is_finished() {
            let opened = opened.load(Ordering::SeqCst);
            let snap = counters.snapshot();
            // Idle after window `opened` began means it has completed.
            assert!(
                !snap.is_idle() || snap.event_count >= opened,
                "idle snapshot with stale count {} < {}",
                snap.event_count,
                opened
            );
        }
        writer.join().unwrap();
        assert_eq!(counters.snapshot().event_count, WINDOWS);
        assert!(counters.snapshot().is_idle());
    }
}
