//! # Wakeup Source
//!
//! Per-source event window state machine.
//!
//! A window is opened by [`WakeupSource::stay_awake`] or
//! [`WakeupSource::notify_event`] and closed by [`WakeupSource::relax`],
//! by the deferred deactivation timer, or immediately by
//! `notify_event(0)`.
//!
//! ## Closing Races
//!
//! The timer path and an explicit `relax` may both try to close the same
//! window. Every close bumps `relax_count`; a close that leaves
//! `relax_count != active_count` is a duplicate and is undone, so
//! `active_count - relax_count` stays in `{0, 1}`.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::fmt;
use core::time::Duration;

use crate::context::Core;
use crate::error::{WakeupError, WakeupResult};
use crate::platform::{TimerHandler, TimerId};
use crate::sync::IrqSpinLock;
use crate::time::Timestamp;

// =============================================================================
// Source State
// =============================================================================

/// Fields guarded by the per-source lock
#[derive(Debug, Default)]
struct SourceState {
    /// Event window open
    active: bool,
    /// Events reported through this source
    event_count: u64,
    /// Windows opened
    active_count: u64,
    /// Windows closed
    relax_count: u64,
    /// Times this source blocked a suspend attempt
    hit_count: u64,
    /// Deferred deactivation timer, set up when the source is registered
    timer: Option<TimerId>,
    /// Latest scheduled deactivation deadline of the open window
    timer_expires: Timestamp,
    /// Opening time of the current window
    last_time: Timestamp,
    /// Sum of closed window durations
    total_time: Duration,
    /// Longest closed window
    max_time: Duration,
}

/// Point-in-time statistics of a wakeup source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeupSourceStats {
    /// Source name
    pub name: Option<String>,
    /// Event window open
    pub active: bool,
    /// Events reported
    pub event_count: u64,
    /// Windows opened
    pub active_count: u64,
    /// Windows closed
    pub relax_count: u64,
    /// Suspend attempts blocked
    pub hit_count: u64,
    /// Sum of closed window durations
    pub total_time: Duration,
    /// Longest closed window
    pub max_time: Duration,
    /// Opening time of the latest window
    pub last_time: Timestamp,
}

// =============================================================================
// Wakeup Source
// =============================================================================

/// A logical producer of wakeup events
pub struct WakeupSource {
    name: Option<String>,
    state: IrqSpinLock<SourceState>,
    core: Arc<Core>,
}

impl WakeupSource {
    /// Allocate an inactive source
    pub(crate) fn create(core: &Arc<Core>, name: Option<&str>) -> WakeupResult<Arc<Self>> {
        let name = match name {
            Some(name) => {
                let mut owned = String::new();
                owned
                    .try_reserve_exact(name.len())
                    .map_err(|_| WakeupError::OutOfMemory)?;
                owned.push_str(name);
                Some(owned)
            },
            None => None,
        };

        Ok(Arc::new(Self {
            name,
            state: IrqSpinLock::new(SourceState::default()),
            core: Arc::clone(core),
        }))
    }

    /// Source name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether an event window is open
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Statistics snapshot
    pub fn stats(&self) -> WakeupSourceStats {
        let state = self.state.lock();
        WakeupSourceStats {
            name: self.name.clone(),
            active: state.active,
            event_count: state.event_count,
            active_count: state.active_count,
            relax_count: state.relax_count,
            hit_count: state.hit_count,
            total_time: state.total_time,
            max_time: state.max_time,
            last_time: state.last_time,
        }
    }

    // -------------------------------------------------------------------------
    // Event Entry Points
    // -------------------------------------------------------------------------

    /// Report a wakeup event and keep the window open until [`Self::relax`]
    ///
    /// Safe to call from interrupt context.
    pub fn stay_awake(&self) {
        let mut state = self.state.lock();
        state.event_count += 1;
        if !state.active {
            self.activate(&mut state);
        }
    }

    /// Close the event window opened by [`Self::stay_awake`]
    ///
    /// No-op if the window is already closed, e.g. by the timer. Safe to
    /// call from interrupt context.
    pub fn relax(&self) {
        let mut state = self.state.lock();
        if state.active {
            self.deactivate(&mut state);
        }
    }

    /// Report a wakeup event that will be processed within `timeout_ms`
    ///
    /// With a zero timeout the window is opened and closed at once.
    /// Otherwise the deferred deactivation deadline is moved to
    /// `now + timeout_ms` unless it is already at or past that point; the
    /// deadline of an open window only ever grows. Safe to call from
    /// interrupt context.
    pub fn notify_event(&self, timeout_ms: u32) {
        let mut state = self.state.lock();

        state.event_count += 1;
        if !state.active {
            self.activate(&mut state);
        }

        if timeout_ms == 0 {
            self.deactivate(&mut state);
            return;
        }

        let expires = self
            .core
            .platform
            .now()
            .saturating_add(Duration::from_millis(u64::from(timeout_ms)));
        if expires <= state.timer_expires {
            return;
        }

        match state.timer {
            Some(id) => {
                self.core.platform.timers.modify(id, expires);
                state.timer_expires = expires;
            },
            None => log::warn!(
                "wakeup: source {:?} is not registered, no deferred deactivation",
                self.name
            ),
        }
    }

    /// Open a window that closes when the returned guard is dropped
    pub fn stay_awake_guard(&self) -> StayAwakeGuard<'_> {
        self.stay_awake();
        StayAwakeGuard { source: self }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Wait until no window is open, then release the source
    ///
    /// Polls at the configured interval. The caller must have removed the
    /// source from its registry first.
    pub fn destroy(self: Arc<Self>) {
        let interval = self.core.config.poll_interval;
        while self.is_active() {
            self.core.platform.waiter.sleep(interval);
        }
        log::debug!("wakeup: destroying source {:?}", self.name);
    }

    /// Bind the deferred deactivation timer
    ///
    /// A fresh source is inactive already; an open window is left alone so
    /// its in-progress count still gets released by the matching close.
    pub(crate) fn init_timer(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.timer.is_none() {
            let weak: Weak<Self> = Arc::downgrade(self);
            let handler: Weak<dyn TimerHandler> = weak;
            state.timer = Some(self.core.platform.timers.setup(handler));
        }
    }

    /// Count a blocked suspend attempt if a window is open
    pub(crate) fn record_hit(&self) -> bool {
        let mut state = self.state.lock();
        if state.active {
            state.hit_count += 1;
        }
        state.active
    }

    // -------------------------------------------------------------------------
    // State Transitions (source lock held)
    // -------------------------------------------------------------------------

    fn activate(&self, state: &mut SourceState) {
        let now = self.core.platform.now();
        state.active = true;
        state.active_count += 1;
        state.timer_expires = now;
        state.last_time = now;

        self.core.counters.begin();
        log::trace!("wakeup: {:?} activated ({})", self.name, state.active_count);
    }

    fn deactivate(&self, state: &mut SourceState) {
        state.relax_count += 1;
        if state.relax_count != state.active_count {
            state.relax_count -= 1;
            log::trace!("wakeup: {:?} duplicate deactivation absorbed", self.name);
            return;
        }

        state.active = false;

        let duration = self.core.platform.now().duration_since(state.last_time);
        state.total_time += duration;
        if duration > state.max_time {
            state.max_time = duration;
        }

        if let Some(id) = state.timer {
            self.core.platform.timers.cancel(id);
        }

        self.core.counters.complete();
        log::trace!("wakeup: {:?} deactivated after {:?}", self.name, duration);
    }
}

impl TimerHandler for WakeupSource {
    fn expire(&self) {
        self.relax();
    }
}

impl Drop for WakeupSource {
    fn drop(&mut self) {
        if let Some(id) = self.state.get_mut().timer.take() {
            self.core.platform.timers.release(id);
        }
    }
}

impl fmt::Debug for WakeupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeupSource")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish()
    }
}

// =============================================================================
// Stay-Awake Guard
// =============================================================================

/// Keeps an event window open while alive
#[derive(Debug)]
pub struct StayAwakeGuard<'a> {
    source: &'a WakeupSource,
}

impl Drop for StayAwakeGuard<'_> {
    fn drop(&mut self) {
        self.source.relax();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimPlatform;

    fn source(sim: &SimPlatform) -> Arc<WakeupSource> {
        sim.events().register(Some("test-source")).unwrap()
    }

    #[test]
    fn test_stay_awake_then_relax() {
        let sim = SimPlatform::new();
        let events = sim.events();
        let ws = source(&sim);

        ws.stay_awake();
        assert!(ws.is_active());
        assert_eq!(ws.stats().active_count, 1);
        assert_eq!(events.events_in_progress(), 1);

        sim.clock().advance(Duration::from_millis(30));
        ws.relax();
        let stats = ws.stats();
        assert!(!stats.active);
        assert_eq!(stats.relax_count, 1);
        assert_eq!(stats.total_time, Duration::from_millis(30));
        assert_eq!(stats.max_time, Duration::from_millis(30));
        assert_eq!(events.event_count(), 1);
        assert_eq!(events.events_in_progress(), 0);
    }

    #[test]
    fn test_stay_awake_is_idempotent_while_active() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.stay_awake();
        ws.stay_awake();
        ws.stay_awake();
        let stats = ws.stats();
        assert_eq!(stats.event_count, 3);
        assert_eq!(stats.active_count, 1);
        assert_eq!(sim.events().events_in_progress(), 1);
    }

    #[test]
    fn test_relax_when_inactive_is_noop() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.relax();
        let stats = ws.stats();
        assert_eq!(stats.relax_count, 0);
        assert_eq!(stats.active_count, 0);
        assert_eq!(sim.events().event_count(), 0);
        assert_eq!(sim.events().events_in_progress(), 0);
    }

    #[test]
    fn test_notify_event_zero_timeout() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(0);
        let stats = ws.stats();
        assert!(!stats.active);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.relax_count, 1);
        assert_eq!(stats.event_count, 1);
        assert_eq!(sim.events().event_count(), 1);
        assert_eq!(sim.events().events_in_progress(), 0);
        assert_eq!(sim.timers().armed_count(), 0);
    }

    #[test]
    fn test_timer_closes_window() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(50);
        assert!(ws.is_active());
        sim.clock().advance(Duration::from_millis(49));
        assert_eq!(sim.timers().fire_expired(), 0);
        assert!(ws.is_active());

        sim.clock().advance(Duration::from_millis(1));
        assert_eq!(sim.timers().fire_expired(), 1);
        assert!(!ws.is_active());
        assert_eq!(ws.stats().total_time, Duration::from_millis(50));
        assert_eq!(sim.events().event_count(), 1);
    }

    #[test]
    fn test_deadline_only_extends() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(100);
        let first = sim.timers().next_deadline();
        assert_eq!(first, Some(Timestamp::from_millis(100)));

        // A shorter timeout leaves the earlier deadline in place.
        ws.notify_event(50);
        assert_eq!(sim.timers().next_deadline(), first);
        sim.clock().advance(Duration::from_millis(60));
        assert_eq!(sim.timers().fire_expired(), 0);
        assert!(ws.is_active());

        // A later one pushes it out.
        ws.notify_event(200);
        assert_eq!(sim.timers().next_deadline(), Some(Timestamp::from_millis(260)));
        sim.clock().advance(Duration::from_millis(40));
        assert_eq!(sim.timers().fire_expired(), 0);
        assert!(ws.is_active());

        sim.clock().advance(Duration::from_millis(160));
        assert_eq!(sim.timers().fire_expired(), 1);
        assert!(!ws.is_active());
        assert_eq!(ws.stats().event_count, 3);
        assert_eq!(sim.events().event_count(), 1);
    }

    #[test]
    fn test_first_deadline_after_reactivation_always_arms() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(500);
        ws.relax();
        assert_eq!(sim.timers().armed_count(), 0);

        ws.notify_event(10);
        assert_eq!(sim.timers().next_deadline(), Some(Timestamp::from_millis(10)));
    }

    #[test]
    fn test_explicit_relax_before_timer() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(50);
        ws.relax();
        assert!(!ws.is_active());
        assert_eq!(sim.timers().armed_count(), 0);

        sim.clock().advance(Duration::from_millis(100));
        assert_eq!(sim.timers().fire_expired(), 0);
        assert_eq!(ws.stats().relax_count, 1);
        assert_eq!(sim.events().event_count(), 1);
    }

    #[test]
    fn test_duplicate_deactivation_absorbed() {
        let sim = SimPlatform::new();
        let ws = source(&sim);

        ws.notify_event(50);
        sim.clock().advance(Duration::from_millis(50));
        sim.timers().fire_expired();

        // A second closer that already passed its `active` check.
        {
            let mut state = ws.state.lock();
            ws.deactivate(&mut state);
        }

        let stats = ws.stats();
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.relax_count, 1);
        assert_eq!(sim.events().event_count(), 1);
        assert_eq!(sim.events().events_in_progress(), 0);
    }

    #[test]
    fn test_stay_awake_guard() {
        let sim = SimPlatform::new();
        let ws = source(&sim);
        {
            let _guard = ws.stay_awake_guard();
            assert!(ws.is_active());
        }
        assert!(!ws.is_active());
        assert_eq!(sim.events().event_count(), 1);
    }

    #[test]
    fn test_unregistered_source_keeps_window_open() {
        let sim = SimPlatform::new();
        let ws = sim.events().create(Some("loose")).unwrap();

        ws.notify_event(10);
        assert_eq!(sim.timers().armed_count(), 0);
        assert!(ws.is_active());
        ws.relax();
        assert!(!ws.is_active());
    }

    #[test]
    fn test_destroy_waits_for_window_to_close() {
        let sim = SimPlatform::new();
        let events = sim.events();
        let ws = source(&sim);

        ws.notify_event(250);
        events.remove(&ws);
        Arc::clone(&ws).destroy();

        // Each poll advances the simulated clock and fires due timers.
        assert_eq!(sim.waiter().sleeps(), 3);
        assert!(!ws.is_active());
        assert_eq!(events.events_in_progress(), 0);
    }

    #[test]
    fn test_drop_releases_timer() {
        let sim = SimPlatform::new();
        let ws = source(&sim);
        assert_eq!(sim.timers().timer_count(), 1);

        sim.events().unregister(ws);
        assert_eq!(sim.timers().timer_count(), 0);
    }
}
