//! # Device Attachment
//!
//! A wakeup-capable device owns at most one wakeup source. The binding is
//! guarded by the device's power lock, which is always taken before the
//! source lock.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

use crate::context::WakeupEvents;
use crate::error::{WakeupError, WakeupResult};
use crate::source::WakeupSource;
use crate::sync::IrqSpinLock;

bitflags! {
    /// Device power management flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DevicePowerFlags: u32 {
        /// Hardware can signal wakeup events
        const CAN_WAKEUP    = 1 << 0;
        /// A wakeup source is attached and events are reported
        const SHOULD_WAKEUP = 1 << 1;
    }
}

/// Power management fields of a device
#[derive(Debug, Default)]
struct DevicePower {
    flags: DevicePowerFlags,
    wakeup: Option<Arc<WakeupSource>>,
}

// =============================================================================
// Device
// =============================================================================

/// Device handle as seen by the wakeup framework
pub struct Device {
    name: String,
    power: IrqSpinLock<DevicePower>,
}

impl Device {
    /// Create a device that is not wakeup-capable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            power: IrqSpinLock::new(DevicePower::default()),
        }
    }

    /// Device identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current power flags
    pub fn flags(&self) -> DevicePowerFlags {
        self.power.lock().flags
    }

    /// Whether the hardware can signal wakeup events
    pub fn can_wakeup(&self) -> bool {
        self.flags().contains(DevicePowerFlags::CAN_WAKEUP)
    }

    /// Whether wakeup reporting is enabled
    pub fn may_wakeup(&self) -> bool {
        self.flags().contains(DevicePowerFlags::SHOULD_WAKEUP)
    }

    /// Set or clear the wakeup-capable flag
    pub fn set_wakeup_capable(&self, capable: bool) {
        self.power
            .lock()
            .flags
            .set(DevicePowerFlags::CAN_WAKEUP, capable);
    }

    /// Attached wakeup source
    pub fn wakeup_source(&self) -> Option<Arc<WakeupSource>> {
        self.power.lock().wakeup.clone()
    }

    /// Bind `ws` to the device; fails if one is already bound
    pub fn attach(&self, ws: Arc<WakeupSource>) -> WakeupResult<()> {
        let mut power = self.power.lock();
        if power.wakeup.is_some() {
            return Err(WakeupError::AlreadyExists);
        }
        power.wakeup = Some(ws);
        power.flags.insert(DevicePowerFlags::SHOULD_WAKEUP);
        Ok(())
    }

    /// Unbind and return the attached source
    pub fn detach(&self) -> Option<Arc<WakeupSource>> {
        let mut power = self.power.lock();
        power.flags.remove(DevicePowerFlags::SHOULD_WAKEUP);
        power.wakeup.take()
    }

    // -------------------------------------------------------------------------
    // Device-Scoped Events
    // -------------------------------------------------------------------------

    /// [`WakeupSource::stay_awake`] on the attached source, if any
    pub fn stay_awake(&self) {
        let power = self.power.lock();
        if let Some(ws) = &power.wakeup {
            ws.stay_awake();
        }
    }

    /// [`WakeupSource::relax`] on the attached source, if any
    pub fn relax(&self) {
        let power = self.power.lock();
        if let Some(ws) = &power.wakeup {
            ws.relax();
        }
    }

    /// [`WakeupSource::notify_event`] on the attached source, if any
    pub fn wakeup_event(&self, timeout_ms: u32) {
        let power = self.power.lock();
        if let Some(ws) = &power.wakeup {
            ws.notify_event(timeout_ms);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let power = self.power.lock();
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("flags", &power.flags)
            .field("wakeup", &power.wakeup.as_ref().and_then(|ws| ws.name()))
            .finish()
    }
}

// =============================================================================
// Enable / Disable
// =============================================================================

impl WakeupEvents {
    /// Register a wakeup source named after `dev` and attach it
    ///
    /// If attaching fails the new source is unregistered again.
    pub fn device_wakeup_enable(&self, dev: &Device) -> WakeupResult<()> {
        if !dev.can_wakeup() {
            return Err(WakeupError::InvalidArgument);
        }

        let ws = self.register(Some(dev.name()))?;
        if let Err(err) = dev.attach(Arc::clone(&ws)) {
            log::debug!("wakeup: {} already has a wakeup source", dev.name());
            self.unregister(ws);
            return Err(err);
        }

        log::debug!("wakeup: enabled wakeup for {}", dev.name());
        Ok(())
    }

    /// Detach and unregister the device's wakeup source, if any
    pub fn device_wakeup_disable(&self, dev: &Device) -> WakeupResult<()> {
        if !dev.can_wakeup() {
            return Err(WakeupError::InvalidArgument);
        }

        if let Some(ws) = dev.detach() {
            self.unregister(ws);
            log::debug!("wakeup: disabled wakeup for {}", dev.name());
        }
        Ok(())
    }

    /// Set the wakeup-capable flag and, when set, enable wakeup
    pub fn device_init_wakeup(&self, dev: &Device, enable: bool) -> WakeupResult<()> {
        dev.set_wakeup_capable(enable);
        if enable {
            self.device_wakeup_enable(dev)
        } else {
            Ok(())
        }
    }

    /// Enable or disable wakeup on a wakeup-capable device
    pub fn device_set_wakeup_enable(&self, dev: &Device, enable: bool) -> WakeupResult<()> {
        if !dev.can_wakeup() {
            return Err(WakeupError::InvalidArgument);
        }

        if enable {
            self.device_wakeup_enable(dev)
        } else {
            self.device_wakeup_disable(dev)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
