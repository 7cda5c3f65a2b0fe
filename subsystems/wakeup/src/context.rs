//! # Wakeup Events Context
//!
//! [`WakeupEvents`] is the single object the power management subsystem
//! constructs at startup. It owns the global event counters, the registry
//! of wakeup sources and the suspend gating state, and hands every source
//! it creates a reference to the shared counters and collaborators.
//!
//! The quiescence protocol lives in [`crate::quiescence`], device
//! attachment in [`crate::device`]; both extend this type.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Once;

use crate::config::WakeupConfig;
use crate::counters::EventCounters;
use crate::error::WakeupResult;
use crate::platform::Platform;
use crate::quiescence::CheckState;
use crate::registry::WakeupRegistry;
use crate::source::{WakeupSource, WakeupSourceStats};
use crate::sync::IrqSpinLock;

// =============================================================================
// Shared Core
// =============================================================================

/// State shared between the context and every wakeup source
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) counters: EventCounters,
    pub(crate) platform: Platform,
    pub(crate) config: WakeupConfig,
}

// =============================================================================
// Wakeup Events
// =============================================================================

/// Wakeup events framework instance
#[derive(Debug)]
pub struct WakeupEvents {
    pub(crate) core: Arc<Core>,
    pub(crate) registry: WakeupRegistry,
    pub(crate) check: IrqSpinLock<CheckState>,
}

impl WakeupEvents {
    /// Create a framework instance with zeroed counters
    pub fn new(platform: Platform, config: WakeupConfig) -> Self {
        Self {
            core: Arc::new(Core {
                counters: EventCounters::new(),
                platform,
                config,
            }),
            registry: WakeupRegistry::new(),
            check: IrqSpinLock::new(CheckState::new()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &WakeupConfig {
        &self.core.config
    }

    /// Injected collaborators
    pub fn platform(&self) -> &Platform {
        &self.core.platform
    }

    /// Global event counters
    pub fn counters(&self) -> &EventCounters {
        &self.core.counters
    }

    /// Registry of wakeup sources
    pub fn registry(&self) -> &WakeupRegistry {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Source Lifecycle
    // -------------------------------------------------------------------------

    /// Allocate a wakeup source without registering it
    pub fn create(&self, name: Option<&str>) -> WakeupResult<Arc<WakeupSource>> {
        WakeupSource::create(&self.core, name)
    }

    /// Set up the source's timer and link it into the registry
    pub fn add(&self, ws: &Arc<WakeupSource>) {
        ws.init_timer();
        self.registry.add(ws);
    }

    /// Unlink a source; returns once no reader can still see it
    pub fn remove(&self, ws: &Arc<WakeupSource>) {
        self.registry.remove(ws);
    }

    /// Create a source and add it to the registry
    pub fn register(&self, name: Option<&str>) -> WakeupResult<Arc<WakeupSource>> {
        let ws = self.create(name)?;
        self.add(&ws);
        Ok(ws)
    }

    /// Remove a source from the registry and destroy it
    pub fn unregister(&self, ws: Arc<WakeupSource>) {
        self.remove(&ws);
        ws.destroy();
    }

    /// Statistics of every registered source
    pub fn sources(&self) -> Vec<WakeupSourceStats> {
        self.registry.read().iter().map(|ws| ws.stats()).collect()
    }

    /// Count a blocked suspend attempt against every active source
    pub fn update_hit_counts(&self) -> usize {
        self.registry.update_hit_counts()
    }

    pub(crate) fn attribute_failure(&self) {
        if self.core.config.hit_counts_on_failure {
            let hits = self.update_hit_counts();
            log::debug!("wakeup: {} active source(s) blocking suspend", hits);
        }
    }
}

// =============================================================================
// Global Instance
// =============================================================================

static GLOBAL_WAKEUP_EVENTS: Once<WakeupEvents> = Once::new();

/// Install the process-wide instance
///
/// The first call wins; later calls return the already installed instance.
pub fn install(events: WakeupEvents) -> &'static WakeupEvents {
    GLOBAL_WAKEUP_EVENTS.call_once(|| events)
}

/// The process-wide instance, if installed
pub fn global() -> Option<&'static WakeupEvents> {
    GLOBAL_WAKEUP_EVENTS.get()
}

// =============================================================================
// Tests
// =============================================================================
