//! # Simulated Collaborators
//!
//! Deterministic clock, timer queue and waiter for tests. Time only moves
//! when a test (or a simulated sleep) advances it, and timers only fire
//! when asked to.

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

use spin::Mutex;

use crate::config::WakeupConfig;
use crate::context::WakeupEvents;
use crate::platform::{Platform, TaskContext, TimerHandler, TimerId, TimerQueue, Waiter};
use crate::time::{Clock, Timestamp};

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Clock at boot time
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let now = self.now().saturating_add(by);
        self.set(now);
    }

    /// Jump to `now`
    pub fn set(&self, now: Timestamp) {
        self.nanos.store(now.as_nanos(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Manual Timer Queue
// =============================================================================

struct ManualTimer {
    handler: Weak<dyn TimerHandler>,
    deadline: Option<Timestamp>,
}

/// Timer queue fired explicitly with [`ManualTimerQueue::fire_expired`]
pub struct ManualTimerQueue {
    clock: Arc<ManualClock>,
    timers: Mutex<BTreeMap<TimerId, ManualTimer>>,
    next_id: AtomicU64,
}

impl ManualTimerQueue {
    /// Queue reading deadlines against `clock`
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            timers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run the handlers of every timer whose deadline has passed
    ///
    /// Returns the number of handlers run.
    pub fn fire_expired(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<Weak<dyn TimerHandler>> = {
            let mut timers = self.timers.lock();
            timers
                .values_mut()
                .filter(|t| t.deadline.is_some_and(|d| d <= now))
                .map(|t| {
                    t.deadline = None;
                    t.handler.clone()
                })
                .collect()
        };

        let mut fired = 0;
        for handler in due {
            if let Some(handler) = handler.upgrade() {
                handler.expire();
                fired += 1;
            }
        }
        fired
    }

    /// Advance the clock to `target`, firing timers at their deadlines
    pub fn advance_to(&self, target: Timestamp) {
        while let Some(deadline) = self.next_deadline().filter(|d| *d <= target) {
            if deadline > self.clock.now() {
                self.clock.set(deadline);
            }
            self.fire_expired();
        }
        if target > self.clock.now() {
            self.clock.set(target);
        }
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.lock().values().filter_map(|t| t.deadline).min()
    }

    /// Number of armed timers
    pub fn armed_count(&self) -> usize {
        self.timers
            .lock()
            .values()
            .filter(|t| t.deadline.is_some())
            .count()
    }

    /// Number of set-up timers, armed or not
    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }
}

impl TimerQueue for ManualTimerQueue {
    fn setup(&self, handler: Weak<dyn TimerHandler>) -> TimerId {
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.timers.lock().insert(
            id,
            ManualTimer {
                handler,
                deadline: None,
            },
        );
        id
    }

    fn modify(&self, id: TimerId, deadline: Timestamp) {
        if let Some(timer) = self.timers.lock().get_mut(&id) {
            timer.deadline = Some(deadline);
        }
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.timers
            .lock()
            .get_mut(&id)
            .and_then(|t| t.deadline.take())
            .is_some()
    }

    fn release(&self, id: TimerId) {
        self.timers.lock().remove(&id);
    }
}

impl fmt::Debug for ManualTimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimerQueue")
            .field("timers", &self.timer_count())
            .field("armed", &self.armed_count())
            .finish()
    }
}

// =============================================================================
// Simulated Waiter
// =============================================================================

/// Waiter whose sleeps advance simulated time and fire due timers
#[derive(Debug)]
pub struct SimWaiter {
    timers: Arc<ManualTimerQueue>,
    sleeps: AtomicUsize,
}

impl SimWaiter {
    /// Waiter driving `timers`
    pub fn new(timers: Arc<ManualTimerQueue>) -> Self {
        Self {
            timers,
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Number of sleeps so far
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Waiter for SimWaiter {
    fn sleep(&self, interval: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        let target = self.timers.clock.now().saturating_add(interval);
        self.timers.advance_to(target);
    }
}

// =============================================================================
// Scripted Task
// =============================================================================

/// Task context with fixed privilege and scripted cancellation
#[derive(Debug)]
pub struct ScriptedTask {
    admin: bool,
    cancel_after: Option<usize>,
    polls: AtomicUsize,
}

impl ScriptedTask {
    /// Unprivileged task that is never signalled
    pub fn user() -> Self {
        Self {
            admin: false,
            cancel_after: None,
            polls: AtomicUsize::new(0),
        }
    }

    /// Privileged task that is never signalled
    pub fn admin() -> Self {
        Self {
            admin: true,
            ..Self::user()
        }
    }

    /// Report a pending signal once polled more than `polls` times
    pub fn cancel_after(mut self, polls: usize) -> Self {
        self.cancel_after = Some(polls);
        self
    }
}

impl TaskContext for ScriptedTask {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn signal_pending(&self) -> bool {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        self.cancel_after.is_some_and(|limit| polls >= limit)
    }
}

// =============================================================================
// Simulated Platform
// =============================================================================

/// Simulated collaborators together with a framework instance
#[derive(Debug)]
pub struct SimPlatform {
    clock: Arc<ManualClock>,
    timers: Arc<ManualTimerQueue>,
    waiter: Arc<SimWaiter>,
    events: WakeupEvents,
}

impl SimPlatform {
    /// Default configuration
    pub fn new() -> Self {
        Self::with_config(WakeupConfig::default())
    }

    /// Custom configuration
    pub fn with_config(config: WakeupConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let timers = Arc::new(ManualTimerQueue::new(Arc::clone(&clock)));
        let waiter = Arc::new(SimWaiter::new(Arc::clone(&timers)));
        let platform = Platform::new(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&timers) as Arc<dyn TimerQueue>,
            Arc::clone(&waiter) as Arc<dyn Waiter>,
        );
        Self {
            clock,
            timers,
            waiter,
            events: WakeupEvents::new(platform, config),
        }
    }

    /// The framework instance
    pub fn events(&self) -> &WakeupEvents {
        &self.events
    }

    /// Take the framework instance, keeping the collaborators alive
    pub fn into_events(self) -> WakeupEvents {
        self.events
    }

    /// Simulated clock
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Simulated timer queue
    pub fn timers(&self) -> &ManualTimerQueue {
        &self.timers
    }

    /// Simulated waiter
    pub fn waiter(&self) -> &SimWaiter {
        &self.waiter
    }

    /// Advance time, firing timers at their deadlines
    pub fn advance(&self, by: Duration) {
        self.timers.advance_to(self.clock.now().saturating_add(by));
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}
