//! # Helix Wakeup Events Framework
//!
//! Decides whether the system may enter a sleep state.
//!
//! Every logical producer of events that should keep the system awake
//! (an interrupt line, an input device, a timer) owns a [`WakeupSource`].
//! Opening an event window on a source bumps the global "in progress"
//! counter, closing it bumps the global "registered events" counter. The
//! suspend orchestrator snapshots the registered counter, and right before
//! the point of no return asks whether anything happened since.
//!
//! ## Components
//!
//! - **Wakeup Source**: per-source state machine with event statistics
//! - **Registry**: RCU-style list of sources, traversed without locks
//! - **Event Counters**: global `event_count` / `events_in_progress` pair
//! - **Quiescence Protocol**: `save_count`, `check_events`, `get_count`
//! - **Device Attachment**: one wakeup source per wakeup-capable device
//!
//! ## Event Window Lifecycle
//!
//! ```text
//!             stay_awake / notify_event(t)
//!   ┌──────────┐ ─────────────────────────▶ ┌──────────┐
//!   │ INACTIVE │                            │  ACTIVE  │──┐ notify_event(t')
//!   └──────────┘ ◀───────────────────────── └──────────┘◀─┘ (deadline only grows)
//!        relax / timer expiry / notify_event(0)
//! ```
//!
//! ## Locking Order
//!
//! Device power lock, then wakeup source lock, then timer queue. The
//! registry writer lock is never held while a source lock is taken.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod context;
pub mod counters;
pub mod device;
pub mod error;
pub mod platform;
pub mod quiescence;
pub mod rcu;
pub mod registry;
pub mod source;
pub mod sync;
pub mod time;

#[cfg(any(test, feature = "std"))]
pub mod host;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::WakeupConfig;
pub use context::{global, install, WakeupEvents};
pub use counters::{CounterSnapshot, EventCounters};
pub use device::{Device, DevicePowerFlags};
pub use error::{WakeupError, WakeupResult};
pub use platform::{Platform, TaskContext, TimerHandler, TimerId, TimerQueue, Waiter};
pub use registry::WakeupRegistry;
pub use source::{StayAwakeGuard, WakeupSource, WakeupSourceStats};
pub use time::{Clock, Timestamp};

/// Interval, in milliseconds, between polls of the blocking operations
pub const WAKEUP_POLL_INTERVAL_MS: u64 = 100;

static_assertions::const_assert!(WAKEUP_POLL_INTERVAL_MS > 0);
static_assertions::assert_impl_all!(WakeupSource: Send, Sync);
static_assertions::assert_impl_all!(WakeupEvents: Send, Sync);
static_assertions::assert_impl_all!(Device: Send, Sync);
