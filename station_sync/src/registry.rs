//! # Device Registry
//!
//! Last-known state of every tracked device, keyed by device code.
//!
//! Updates replace a record wholesale. A compound device that reports child
//! slots also has each coded child stored under the child's own code, so the
//! unit and its logical sub-slots are individually addressable. There is no
//! deletion: a device that stops reporting simply keeps its last state.
//!
//! Iteration is in lexicographic code order, which is what makes every
//! derived value (occupancy, operation mode) deterministic.

use std::collections::BTreeMap;

use crate::model::Device;

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `device` under `code` and each coded child under its own code.
    ///
    /// Returns `true` when any stored record actually changed.
    pub fn apply_update(&mut self, code: &str, device: Device) -> bool {
        let mut changed = false;
        for child in device.children.iter().filter(|c| !c.code.trim().is_empty()) {
            changed |= self.store(&child.code, child.clone());
        }
        changed |= self.store(code, device);
        changed
    }

    fn store(&mut self, code: &str, device: Device) -> bool {
        match self.devices.get(code) {
            Some(existing) if *existing == device => false,
            _ => {
                self.devices.insert(code.to_string(), device);
                true
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<&Device> {
        self.devices.get(code)
    }

    /// `true` when `code` is tracked as an entry of its own.
    pub fn contains(&self, code: &str) -> bool {
        self.devices.contains_key(code)
    }

    /// All records in lexicographic code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.devices.iter().map(|(code, device)| (code.as_str(), device))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(code: &str, pallet: &str) -> Device {
        Device {
            code: code.to_string(),
            pallet_code: Some(pallet.to_string()),
            ..Device::default()
        }
    }

    #[test]
    fn replaces_records_wholesale() {
        let mut registry = DeviceRegistry::new();
        let mut first = device("Crn2001", "PAL-1");
        first.work_status = Some(3);
        assert!(registry.apply_update("Crn2001", first));

        // The second report has no workStatus; the old one must not survive.
        assert!(registry.apply_update("Crn2001", device("Crn2001", "PAL-2")));
        let stored = registry.get("Crn2001").unwrap();
        assert_eq!(stored.tray(), Some("PAL-2"));
        assert_eq!(stored.work_status, None);
    }

    #[test]
    fn identical_update_reports_no_change() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.apply_update("Tran3001", device("Tran3001", "")));
        assert!(!registry.apply_update("Tran3001", device("Tran3001", "")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stores_coded_children_individually() {
        let mut registry = DeviceRegistry::new();
        let line = Device {
            code: "TranLine3000".into(),
            children: vec![device("Tran3002", "PAL-2"), device("", "PAL-X")],
            ..Device::default()
        };
        registry.apply_update("TranLine3000", line);
        assert!(registry.contains("TranLine3000"));
        assert_eq!(registry.get("Tran3002").and_then(Device::tray), Some("PAL-2"));
        assert!(!registry.contains(""));
        assert_eq!(registry.len(), 2);
        let codes: Vec<&str> = registry.iter().map(|(code, _)| code).collect();
        assert_eq!(codes, vec!["Tran3002", "TranLine3000"]);
    }
}
