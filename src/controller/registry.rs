//! Device enumeration and re-attachment of stored bindings
//!
//! Runtime ids are only valid for one process. Bindings are stored by
//! device name and matched back to whatever id that name has today.

use super::backend::{DeviceInfo, InputBackend, RuntimeId};
use crate::mapping::binding::{BindingTable, TrimFunction};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub runtime_id: Option<RuntimeId>,
}

impl From<&DeviceInfo> for DeviceIdentity {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            name: info.name.clone(),
            runtime_id: Some(info.runtime_id),
        }
    }
}

/// Every device the backend reports right now, in enumeration order.
pub fn enumerate_devices(backend: &dyn InputBackend) -> Vec<DeviceIdentity> {
    let devices: Vec<DeviceIdentity> = backend.devices().iter().map(DeviceIdentity::from).collect();
    debug!("Enumerated {} devices", devices.len());
    devices
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub table: BindingTable,
    /// Functions whose device is connected
    pub rebound: Vec<TrimFunction>,
    /// Functions kept without a runtime id
    pub detached: Vec<TrimFunction>,
}

/// Rewrites every binding's runtime id from the connected device list.
///
/// With two devices of the same name the first one enumerated wins.
/// Bindings whose device is absent are kept, detached.
pub fn reconcile(table: &BindingTable, devices: &[DeviceIdentity]) -> ReconcileReport {
    let mut by_name: HashMap<&str, RuntimeId> = HashMap::new();
    for device in devices {
        let Some(id) = device.runtime_id else { continue };
        if by_name.contains_key(device.name.as_str()) {
            warn!(
                "Duplicate device name {:?} (runtime id {}), keeping the first",
                device.name, id
            );
            continue;
        }
        by_name.insert(device.name.as_str(), id);
    }

    let mut report = ReconcileReport {
        table: table.clone(),
        ..Default::default()
    };
    for binding in report.table.iter_mut() {
        binding.runtime_id = by_name.get(binding.device_name.as_str()).copied();
        match binding.runtime_id {
            Some(id) => {
                info!(
                    "{} bound to {} (device {})",
                    binding.function, binding.device_name, id
                );
                report.rebound.push(binding.function);
            }
            None => {
                info!(
                    "{} bound to {}, which is not connected",
                    binding.function, binding.device_name
                );
                report.detached.push(binding.function);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backend::VirtualBackend;
    use crate::mapping::binding::{Binding, Control};

    fn stored(function: TrimFunction, device: &str) -> Binding {
        Binding {
            function,
            device_name: device.to_string(),
            runtime_id: None,
            control: Control::Button { index: 2 },
        }
    }

    fn device(name: &str, id: RuntimeId) -> DeviceIdentity {
        DeviceIdentity {
            name: name.to_string(),
            runtime_id: Some(id),
        }
    }

    #[test]
    fn enumeration_follows_the_backend() {
        let backend = VirtualBackend::new();
        backend.add_device(3, "Stick", 4, 0);
        backend.add_device(9, "Pedals", 2, 0);

        let names: Vec<_> = enumerate_devices(&backend)
            .into_iter()
            .map(|d| (d.name, d.runtime_id))
            .collect();
        assert_eq!(
            names,
            vec![("Stick".to_string(), Some(3)), ("Pedals".to_string(), Some(9))]
        );
    }

    #[test]
    fn absent_device_is_kept_detached() {
        let mut table = BindingTable::new();
        table.insert(stored(TrimFunction::Left, "Stick1"));
        table.insert(Binding {
            control: Control::Button { index: 4 },
            ..stored(TrimFunction::Right, "Yoke")
        });

        let report = reconcile(&table, &[device("Stick1", 7)]);

        assert_eq!(report.rebound, vec![TrimFunction::Left]);
        assert_eq!(report.detached, vec![TrimFunction::Right]);
        assert_eq!(
            report.table.get(TrimFunction::Left).and_then(|b| b.runtime_id),
            Some(7)
        );
        let yoke = report.table.get(TrimFunction::Right).unwrap();
        assert_eq!(yoke.runtime_id, None);
        assert_eq!(yoke.device_name, "Yoke");
    }

    #[test]
    fn first_device_with_a_name_wins() {
        let mut table = BindingTable::new();
        table.insert(stored(TrimFunction::Set, "Stick"));

        let report = reconcile(&table, &[device("Stick", 4), device("Stick", 2)]);
        assert_eq!(
            report.table.get(TrimFunction::Set).and_then(|b| b.runtime_id),
            Some(4)
        );
    }

    #[test]
    fn stale_ids_are_replaced() {
        let mut table = BindingTable::new();
        table.insert(Binding {
            runtime_id: Some(11),
            ..stored(TrimFunction::Release, "Stick")
        });

        let report = reconcile(&table, &[]);
        assert_eq!(
            report.table.get(TrimFunction::Release).and_then(|b| b.runtime_id),
            None
        );
    }
}
