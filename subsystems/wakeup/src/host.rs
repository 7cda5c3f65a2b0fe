//! # Host Platform Backend
//!
//! Collaborators backed by the standard library, for running the framework
//! in a hosted process (simulators, user-space power daemons, tests).
//!
//! Timers are served by one background thread. Handlers run on that thread
//! with the queue lock released, so a handler can cancel its own timer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::platform::{Platform, TaskContext, TimerHandler, TimerId, TimerQueue, Waiter};
use crate::time::{Clock, Timestamp};

// =============================================================================
// Clock
// =============================================================================

/// Monotonic clock counting from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Clock starting at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let nanos = self.origin.elapsed().as_nanos();
        Timestamp::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

// =============================================================================
// Thread Timer Queue
// =============================================================================

struct HostTimer {
    handler: Weak<dyn TimerHandler>,
    deadline: Option<Timestamp>,
}

#[derive(Default)]
struct TimerTable {
    next_id: u64,
    timers: BTreeMap<TimerId, HostTimer>,
    shutdown: bool,
}

struct TimerShared {
    table: Mutex<TimerTable>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
}

impl TimerShared {
    fn table(&self) -> MutexGuard<'_, TimerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        let mut table = self.table();
        loop {
            if table.shutdown {
                return;
            }

            let now = self.clock.now();
            let due: Vec<Weak<dyn TimerHandler>> = table
                .timers
                .values_mut()
                .filter(|t| t.deadline.is_some_and(|d| d <= now))
                .map(|t| {
                    t.deadline = None;
                    t.handler.clone()
                })
                .collect();

            if !due.is_empty() {
                drop(table);
                for handler in due {
                    if let Some(handler) = handler.upgrade() {
                        handler.expire();
                    }
                }
                table = self.table();
                continue;
            }

            let next = table.timers.values().filter_map(|t| t.deadline).min();
            table = match next {
                Some(deadline) => {
                    let timeout = deadline.duration_since(now);
                    self.wake
                        .wait_timeout(table, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                },
                None => self.wake.wait(table).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// Timer queue served by a background thread
pub struct ThreadTimerQueue {
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl ThreadTimerQueue {
    /// Spawn the timer thread
    pub fn new(clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        let shared = Arc::new(TimerShared {
            table: Mutex::new(TimerTable::default()),
            wake: Condvar::new(),
            clock,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("wakeup-timers".into())
                .spawn(move || shared.run())?
        };
        let worker_id = worker.thread().id();

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// Number of armed timers
    pub fn armed_count(&self) -> usize {
        self.shared
            .table()
            .timers
            .values()
            .filter(|t| t.deadline.is_some())
            .count()
    }
}

impl TimerQueue for ThreadTimerQueue {
    fn setup(&self, handler: Weak<dyn TimerHandler>) -> TimerId {
        let mut table = self.shared.table();
        table.next_id += 1;
        let id = TimerId::new(table.next_id);
        table.timers.insert(
            id,
            HostTimer {
                handler,
                deadline: None,
            },
        );
        id
    }

    fn modify(&self, id: TimerId, deadline: Timestamp) {
        let mut table = self.shared.table();
        if let Some(timer) = table.timers.get_mut(&id) {
            timer.deadline = Some(deadline);
            self.shared.wake.notify_one();
        }
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.shared
            .table()
            .timers
            .get_mut(&id)
            .and_then(|t| t.deadline.take())
            .is_some()
    }

    fn release(&self, id: TimerId) {
        self.shared.table().timers.remove(&id);
    }
}

impl Drop for ThreadTimerQueue {
    fn drop(&mut self) {
        self.shared.table().shutdown = true;
        self.shared.wake.notify_one();

        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // The last reference may go away inside a handler on the timer
        // thread itself; it exits on its own once the handler returns.
        if thread::current().id() != self.worker_id {
            if let Some(worker) = worker {
                if worker.join().is_err() {
                    log::warn!("wakeup: timer thread panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for ThreadTimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimerQueue")
            .field("armed", &self.armed_count())
            .finish()
    }
}

// =============================================================================
// Waiter and Task
// =============================================================================

/// Waiter backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadWaiter;

impl Waiter for ThreadWaiter {
    fn sleep(&self, interval: Duration) {
        thread::sleep(interval);
    }
}

/// Task context for a host thread
#[derive(Debug, Default)]
pub struct HostTask {
    admin: bool,
    cancelled: AtomicBool,
}

impl HostTask {
    /// Unprivileged task
    pub fn user() -> Self {
        Self::default()
    }

    /// Privileged task
    pub fn admin() -> Self {
        Self {
            admin: true,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Deliver a cancellation signal
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl TaskContext for HostTask {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn signal_pending(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Platform {
    /// Host collaborators: monotonic clock, timer thread, thread sleep
    pub fn host() -> std::io::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let timers = Arc::new(ThreadTimerQueue::new(Arc::clone(&clock))?);
        Ok(Self::new(clock, timers, Arc::new(ThreadWaiter)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WakeupConfig;
    use crate::context::WakeupEvents;
    use crate::error::WakeupError;

    fn host_events() -> Arc<WakeupEvents> {
        let config = WakeupConfig::new().with_poll_interval(Duration::from_millis(2));
        Arc::new(WakeupEvents::new(Platform::host().unwrap(), config))
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > a);
    }

    #[test]
    fn test_timer_thread_closes_window() {
        let events = host_events();
        let ws = events.register(Some("host")).unwrap();

        ws.notify_event(10);
        let count = events.get_count(&HostTask::user()).unwrap();
        assert_eq!(count, 1);
        assert!(!ws.is_active());
        assert!(ws.stats().total_time >= Duration::from_millis(10));
    }

    #[test]
    fn test_get_count_cancelled_from_another_thread() {
        let events = host_events();
        let ws = events.register(Some("stuck")).unwrap();
        ws.stay_awake();

        let task = Arc::new(HostTask::admin());
        let canceller = {
            let task = Arc::clone(&task);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                task.cancel();
            })
        };

        assert_eq!(
            events.get_count(&*task),
            Err(WakeupError::Interrupted { count: 0 })
        );
        canceller.join().unwrap();
        ws.relax();
        assert_eq!(events.get_count(&HostTask::user()), Ok(1));
    }

    #[test]
    fn test_racing_relax_and_timer() {
        let events = host_events();
        let ws = events.register(Some("racy")).unwrap();

        for round in 1..=50_u32 {
            ws.notify_event(1);
            thread::sleep(Duration::from_micros(900 + u64::from(round % 3) * 100));
            ws.relax();
            assert_eq!(events.get_count(&HostTask::user()), Ok(round));
        }

        let stats = ws.stats();
        assert_eq!(stats.active_count, 50);
        assert_eq!(stats.relax_count, 50);
    }

    #[test]
    fn test_stress_many_closers() {
        let events = host_events();
        let ws = events.register(Some("contended")).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let ws = Arc::clone(&ws);
                thread::spawn(move || {
                    for i in 0..500_u32 {
                        match (worker + i) % 3 {
                            0 => ws.stay_awake(),
                            1 => ws.notify_event(1 + i % 2),
                            _ => ws.relax(),
                        }
                        let stats = ws.stats();
                        let open = stats.active_count - stats.relax_count;
                        assert!(open <= 1);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        ws.relax();
        let count = events.get_count(&HostTask::user()).unwrap();

        let stats = ws.stats();
        assert!(!stats.active);
        assert_eq!(stats.active_count, stats.relax_count);
        assert_eq!(u64::from(count), stats.relax_count);
        assert_eq!(events.events_in_progress(), 0);
    }
}
