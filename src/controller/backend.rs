//! Seam between the event monitor and whatever reads the hardware

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle the input subsystem assigns to a device for this process only
pub type RuntimeId = usize;

/// Direction reported by a POV hat, `(0, 0)` when centered
///
/// `x` is -1 (left) .. 1 (right), `y` is -1 (down) .. 1 (up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HatDirection {
    pub x: i8,
    pub y: i8,
}

impl HatDirection {
    pub const CENTERED: HatDirection = HatDirection { x: 0, y: 0 };
    pub const UP: HatDirection = HatDirection { x: 0, y: 1 };
    pub const DOWN: HatDirection = HatDirection { x: 0, y: -1 };
    pub const LEFT: HatDirection = HatDirection { x: -1, y: 0 };
    pub const RIGHT: HatDirection = HatDirection { x: 1, y: 0 };

    pub fn new(x: i8, y: i8) -> Self {
        Self {
            x: x.signum(),
            y: y.signum(),
        }
    }

    pub fn is_centered(&self) -> bool {
        *self == Self::CENTERED
    }
}

impl fmt::Display for HatDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// What the input subsystem reports about one attached device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub runtime_id: RuntimeId,
    pub buttons: usize,
    pub hats: usize,
}

/// Source of device lists and raw button/hat state
///
/// `button` and `hat` return `None` once the device is gone.
pub trait InputBackend: Send {
    /// Drains the subsystem's event queue so the reads below are current.
    fn pump(&mut self);

    fn devices(&self) -> Vec<DeviceInfo>;

    fn button(&self, device: RuntimeId, index: u8) -> Option<bool>;

    fn hat(&self, device: RuntimeId, index: u8) -> Option<HatDirection>;
}

#[derive(Debug)]
struct VirtualDevice {
    name: String,
    buttons: Vec<bool>,
    hats: Vec<HatDirection>,
    connected: bool,
}

type VirtualDevices = Arc<Mutex<BTreeMap<RuntimeId, VirtualDevice>>>;

fn lock_devices(devices: &VirtualDevices) -> MutexGuard<'_, BTreeMap<RuntimeId, VirtualDevice>> {
    devices.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process devices driven through [`VirtualDeviceHandle`]s
#[derive(Debug, Clone, Default)]
pub struct VirtualBackend {
    devices: VirtualDevices,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(
        &self,
        runtime_id: RuntimeId,
        name: &str,
        buttons: usize,
        hats: usize,
    ) -> VirtualDeviceHandle {
        lock_devices(&self.devices).insert(
            runtime_id,
            VirtualDevice {
                name: name.to_string(),
                buttons: vec![false; buttons],
                hats: vec![HatDirection::CENTERED; hats],
                connected: true,
            },
        );
        VirtualDeviceHandle {
            runtime_id,
            devices: self.devices.clone(),
        }
    }
}

impl InputBackend for VirtualBackend {
    fn pump(&mut self) {}

    fn devices(&self) -> Vec<DeviceInfo> {
        lock_devices(&self.devices)
            .iter()
            .filter(|(_, device)| device.connected)
            .map(|(id, device)| DeviceInfo {
                name: device.name.clone(),
                runtime_id: *id,
                buttons: device.buttons.len(),
                hats: device.hats.len(),
            })
            .collect()
    }

    fn button(&self, device: RuntimeId, index: u8) -> Option<bool> {
        let devices = lock_devices(&self.devices);
        let device = devices.get(&device).filter(|d| d.connected)?;
        device.buttons.get(usize::from(index)).copied()
    }

    fn hat(&self, device: RuntimeId, index: u8) -> Option<HatDirection> {
        let devices = lock_devices(&self.devices);
        let device = devices.get(&device).filter(|d| d.connected)?;
        device.hats.get(usize::from(index)).copied()
    }
}

/// Drives one virtual device; clones share the same state
#[derive(Debug, Clone)]
pub struct VirtualDeviceHandle {
    runtime_id: RuntimeId,
    devices: VirtualDevices,
}

impl VirtualDeviceHandle {
    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime_id
    }

    pub fn set_button(&self, index: u8, pressed: bool) {
        if let Some(device) = lock_devices(&self.devices).get_mut(&self.runtime_id) {
            if let Some(button) = device.buttons.get_mut(usize::from(index)) {
                *button = pressed;
            }
        }
    }

    pub fn press(&self, index: u8) {
        self.set_button(index, true);
    }

    pub fn release(&self, index: u8) {
        self.set_button(index, false);
    }

    pub fn set_hat(&self, index: u8, direction: HatDirection) {
        if let Some(device) = lock_devices(&self.devices).get_mut(&self.runtime_id) {
            if let Some(hat) = device.hats.get_mut(usize::from(index)) {
                *hat = direction;
            }
        }
    }

    pub fn disconnect(&self) {
        if let Some(device) = lock_devices(&self.devices).get_mut(&self.runtime_id) {
            device.connected = false;
        }
    }
}
