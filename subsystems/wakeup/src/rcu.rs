//! # RCU List
//!
//! A copy-on-write list whose readers never take a lock.
//!
//! Writers build a new snapshot under the writer lock, publish it with a
//! single pointer swap and then wait for a grace period before freeing the
//! snapshot they replaced. Readers pin the current epoch, load the pointer
//! and walk the snapshot; a reader therefore sees either the old list or
//! the new one, never a half-built entry and never a freed one.
//!
//! ## Grace Period
//!
//! ```text
//!  epoch:      e            e+1           e+2
//!  readers: [slot e&1] ──▶ drain ──▶ [slot (e+1)&1] ──▶ drain ──▶ free old
//! ```
//!
//! A reader registers in the slot of the epoch it observed and re-checks
//! the epoch afterwards, retrying if a flip raced with it. Two consecutive
//! flips, each followed by draining the slot it retired, cover every
//! reader that could still hold the old snapshot. Grace periods are
//! serialized so the flips are always consecutive.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use spin::Mutex;

use crate::sync::IrqSpinLock;

// =============================================================================
// List
// =============================================================================

/// Copy-on-write list with lock-free readers
pub struct RcuList<T> {
    /// Published snapshot, always a leaked `Box<Vec<T>>`
    head: AtomicPtr<Vec<T>>,
    /// Grace period epoch
    epoch: AtomicUsize,
    /// Readers pinned in even / odd epochs
    readers: [AtomicUsize; 2],
    /// Serializes writers
    writer: IrqSpinLock<()>,
    /// Serializes grace periods
    grace: Mutex<()>,
}

// SAFETY: the list owns its snapshots; elements are shared across readers
// on any CPU, hence the Send + Sync bounds on T.
unsafe impl<T: Send + Sync> Send for RcuList<T> {}
unsafe impl<T: Send + Sync> Sync for RcuList<T> {}

impl<T> RcuList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(Box::into_raw(Box::new(Vec::new()))),
            epoch: AtomicUsize::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            writer: IrqSpinLock::new(()),
            grace: Mutex::new(()),
        }
    }

    /// Enter a read-side critical section
    pub fn read(&self) -> RcuReadGuard<'_, T> {
        let slot = loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let slot = epoch & 1;
            self.readers[slot].fetch_add(1, Ordering::SeqCst);
            if self.epoch.load(Ordering::SeqCst) == epoch {
                break slot;
            }
            self.readers[slot].fetch_sub(1, Ordering::SeqCst);
        };

        let ptr = self.head.load(Ordering::Acquire);
        // SAFETY: `ptr` came from `Box::into_raw` and is only freed after a
        // grace period that waits for the slot pinned above.
        let snapshot = unsafe { &*ptr };
        RcuReadGuard {
            list: self,
            slot,
            snapshot,
        }
    }

    /// Wait until every reader that might see a retired snapshot has left
    pub fn synchronize(&self) {
        let _grace = self.grace.lock();
        for _ in 0..2 {
            let retired = self.epoch.fetch_add(1, Ordering::SeqCst) & 1;
            while self.readers[retired].load(Ordering::SeqCst) != 0 {
                core::hint::spin_loop();
            }
        }
    }

    /// Number of elements in the current snapshot
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the current snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<T: Clone> RcuList<T> {
    /// Apply `update` to a copy of the list and publish the result
    ///
    /// Returns once the replaced snapshot has been reclaimed, so every
    /// reader that could observe the previous contents has finished.
    pub fn update<R>(&self, update: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let (old, result) = {
            let _writer = self.writer.lock();
            // SAFETY: only writers free snapshots, and the current head is
            // never freed while the writer lock is held.
            let current = unsafe { &*self.head.load(Ordering::Acquire) };
            let mut next = current.clone();
            let result = update(&mut next);
            let old = self
                .head
                .swap(Box::into_raw(Box::new(next)), Ordering::AcqRel);
            (old, result)
        };

        self.synchronize();

        // SAFETY: `old` is unreachable from `head` and the grace period
        // above has drained every reader that loaded it.
        drop(unsafe { Box::from_raw(old) });
        result
    }
}

impl<T> Default for RcuList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RcuList<T> {
    fn drop(&mut self) {
        // SAFETY: exclusive access, no reader guard can outlive `self`.
        drop(unsafe { Box::from_raw(*self.head.get_mut()) });
    }
}

impl<T> fmt::Debug for RcuList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcuList")
            .field("len", &self.len())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Read Guard
// =============================================================================

/// Read-side critical section over one snapshot
pub struct RcuReadGuard<'a, T> {
    list: &'a RcuList<T>,
    slot: usize,
    snapshot: &'a Vec<T>,
}

impl<T> Deref for RcuReadGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.snapshot
    }
}

impl<T> Drop for RcuReadGuard<'_, T> {
    fn drop(&mut self) {
        self.list.readers[self.slot].fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> fmt::Debug for RcuReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcuReadGuard")
            .field("slot", &self.slot)
            .field("len", &self.snapshot.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
