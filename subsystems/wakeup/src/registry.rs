//! # Wakeup Source Registry
//!
//! The set of registered wakeup sources. Mutations are rare (device probe
//! and removal) and serialized; traversal happens on every failed suspend
//! attempt and never blocks a writer.

use alloc::sync::Arc;

use crate::rcu::{RcuList, RcuReadGuard};
use crate::source::WakeupSource;

/// Registered wakeup sources
#[derive(Debug, Default)]
pub struct WakeupRegistry {
    sources: RcuList<Arc<WakeupSource>>,
}

impl WakeupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sources: RcuList::new(),
        }
    }

    /// Link a source; returns `false` if it was already registered
    ///
    /// The source is published fully initialized: lock-free readers see it
    /// entirely or not at all.
    pub fn add(&self, ws: &Arc<WakeupSource>) -> bool {
        let added = self.sources.update(|list| {
            if list.iter().any(|s| Arc::ptr_eq(s, ws)) {
                return false;
            }
            list.push(Arc::clone(ws));
            true
        });

        if added {
            log::debug!("wakeup: registered source {:?}", ws.name());
        } else {
            log::warn!("wakeup: source {:?} is already registered", ws.name());
        }
        added
    }

    /// Unlink a source; returns `false` if it was not registered
    ///
    /// Returns only after every reader that started before the unlink has
    /// finished, so the caller may destroy the source afterwards.
    pub fn remove(&self, ws: &Arc<WakeupSource>) -> bool {
        let removed = self.sources.update(|list| {
            match list.iter().position(|s| Arc::ptr_eq(s, ws)) {
                Some(pos) => {
                    list.swap_remove(pos);
                    true
                },
                None => false,
            }
        });

        if removed {
            log::debug!("wakeup: unregistered source {:?}", ws.name());
        } else {
            log::warn!("wakeup: source {:?} is not registered", ws.name());
        }
        removed
    }

    /// Whether `ws` is registered
    pub fn contains(&self, ws: &Arc<WakeupSource>) -> bool {
        self.sources.read().iter().any(|s| Arc::ptr_eq(s, ws))
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Lock-free traversal of the current sources
    pub fn read(&self) -> RcuReadGuard<'_, Arc<WakeupSource>> {
        self.sources.read()
    }

    /// Bump the hit count of every active source
    ///
    /// Returns the number of sources that were active.
    pub fn update_hit_counts(&self) -> usize {
        self.read().iter().filter(|ws| ws.record_hit()).count()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimPlatform;

    #[test]
    fn test_add_remove() {
        let sim = SimPlatform::new();
        let ws = sim.events().create(Some("rtc")).unwrap();
        let registry = WakeupRegistry::new();

        assert!(registry.is_empty());
        assert!(registry.add(&ws));
        assert!(registry.contains(&ws));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&ws));
        assert!(!registry.contains(&ws));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_add_and_stray_remove_are_noops() {
        let sim = SimPlatform::new();
        let ws = sim.events().create(Some("rtc")).unwrap();
        let other = sim.events().create(Some("other")).unwrap();
        let registry = WakeupRegistry::new();

        assert!(registry.add(&ws));
        assert!(!registry.add(&ws));
        assert_eq!(registry.len(), 1);

        assert!(!registry.remove(&other));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_traversal_during_mutation() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let sim = SimPlatform::new();
        let events = Arc::new(sim.into_events());
        let stop = Arc::new(AtomicBool::new(false));

        let busy = events.register(Some("busy")).unwrap();
        busy.stay_awake();

        let reader = {
            let events = Arc::clone(&events);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut passes = 0_u64;
                while !stop.load(Ordering::Relaxed) {
                    assert!(events.update_hit_counts() >= 1);
                    passes += 1;
                }
                passes
            })
        };

        for i in 0..100 {
            let name = std::format!("transient-{}", i);
            let ws = events.register(Some(&name)).unwrap();
            events.unregister(ws);
        }
        stop.store(true, Ordering::Relaxed);

        let passes = reader.join().unwrap();
        assert_eq!(busy.stats().hit_count, passes);
        assert_eq!(events.registry().len(), 1);
        busy.relax();
    }
}
