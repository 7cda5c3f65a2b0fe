//! # Interrupt-Safe Locking
//!
//! Wakeup sources are touched from interrupt handlers, so every lock that
//! guards them must be taken with local interrupts disabled. Otherwise an
//! interrupt arriving on the CPU that already holds the lock spins forever.
//!
//! The architecture code installs an [`InterruptMask`] once during early
//! boot. Until then (and on host builds) masking is a no-op.

use core::fmt;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard, Once};

// =============================================================================
// Interrupt Mask
// =============================================================================

/// Local interrupt control supplied by the architecture layer
pub trait InterruptMask: Send + Sync {
    /// Disable local interrupts, returning whether they were enabled
    fn save_and_disable(&self) -> bool;

    /// Restore the state returned by `save_and_disable`
    fn restore(&self, was_enabled: bool);
}

static INTERRUPT_MASK: Once<&'static dyn InterruptMask> = Once::new();

/// Install the interrupt mask used by every [`IrqSpinLock`]
///
/// Returns `false` if a mask was already installed.
pub fn install_interrupt_mask(mask: &'static dyn InterruptMask) -> bool {
    let mut installed = false;
    INTERRUPT_MASK.call_once(|| {
        installed = true;
        mask
    });
    installed
}

/// RAII guard for interrupt state
///
/// Disables interrupts when created, restores previous state when dropped.
struct InterruptGuard {
    was_enabled: bool,
}

impl InterruptGuard {
    fn new() -> Self {
        let was_enabled = INTERRUPT_MASK
            .get()
            .map(|mask| mask.save_and_disable())
            .unwrap_or(false);
        Self { was_enabled }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(mask) = INTERRUPT_MASK.get() {
            mask.restore(self.was_enabled);
        }
    }
}

// =============================================================================
// IRQ-Safe Spinlock
// =============================================================================

/// Spinlock held with local interrupts disabled
pub struct IrqSpinLock<T: ?Sized> {
    inner: Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    /// Create a new unlocked lock
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Consume the lock, returning the protected value
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> IrqSpinLock<T> {
    /// Disable interrupts and spin until the lock is acquired
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = InterruptGuard::new();
        let guard = self.inner.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }

    /// Mutable access without locking (requires exclusive ownership)
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default> Default for IrqSpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for IrqSpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqSpinLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// Guard returned by [`IrqSpinLock::lock`]
///
/// Field order matters: the spinlock is released before interrupts are
/// restored.
pub struct IrqSpinLockGuard<'a, T: ?Sized> {
    guard: MutexGuard<'a, T>,
    _irq: InterruptGuard,
}

impl<T: ?Sized> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized> fmt::Debug for IrqSpinLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IrqSpinLockGuard")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_provides_mut_access() {
        let lock = IrqSpinLock::new(1_u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    fn test_get_mut_and_into_inner() {
        let mut lock = IrqSpinLock::new(5_u32);
        *lock.get_mut() = 7;
        assert_eq!(lock.into_inner(), 7);
    }

    #[test]
    fn test_lock_across_threads() {
        use std::sync::Arc;

        let lock = Arc::new(IrqSpinLock::new(0_u64));
        let handles: std::vec::Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }
}
