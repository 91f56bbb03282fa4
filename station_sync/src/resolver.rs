//! # Container Resolver
//!
//! Derives, wholly and deterministically from a `DeviceRegistry`, which
//! container occupies each station slot, which trays are visible anywhere on
//! the floor, and the current operation mode.
//!
//! Rules for the floor-wide tray map:
//! - A compound device whose children are not tracked on their own contributes
//!   one synthetic slot per child holding a tray. Uncoded children are keyed
//!   `"{parent}_child_{index}"`. No work-status filter applies here.
//! - A plain device contributes its tray only when it is a station lane
//!   (`Tran*`) or reports a non-idle work status, so parked equipment is not
//!   shown as holding anything meaningful.
//! - When several devices claim the same tray, a station slot wins over other
//!   equipment; otherwise the lexicographically greater device code wins.

use std::collections::BTreeMap;

use crate::model::Device;
use crate::registry::DeviceRegistry;

/// Operation mode reported before any device announced one.
pub const DEFAULT_OPERATION_MODE: &str = "InOut";

/// Code prefix of conveyor lane slots, which count as occupied regardless of
/// work status.
pub const STATION_PREFIX: &str = "Tran";

/// A tray seen on a device slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraySlot {
    pub tray_code: String,
    pub device_code: String,
    pub device_name: String,
    pub location: String,
}

/// A distinct container on the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub code: String,
    pub location: String,
    pub device_name: String,
}

/// Output of one resolver pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Station slot code -> container code (`""` when vacant).
    pub occupancy: BTreeMap<String, String>,
    /// Slot key -> tray held there.
    pub trays: BTreeMap<String, TraySlot>,
    /// One entry per distinct tray code, ordered by tray code.
    pub containers: Vec<ContainerInfo>,
    pub operation_mode: String,
}

impl Resolution {
    /// Everything vacant, default operation mode.
    pub fn empty(stations: &[String]) -> Self {
        Self {
            occupancy: stations.iter().map(|s| (s.clone(), String::new())).collect(),
            trays: BTreeMap::new(),
            containers: Vec::new(),
            operation_mode: DEFAULT_OPERATION_MODE.to_string(),
        }
    }

    /// Container at `station`, `""` when vacant or unknown.
    pub fn container_at(&self, station: &str) -> &str {
        self.occupancy.get(station).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct ContainerResolver {
    stations: Vec<String>,
}

impl ContainerResolver {
    pub fn new(stations: Vec<String>) -> Self {
        Self { stations }
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn is_station(&self, code: &str) -> bool {
        self.stations.iter().any(|s| s == code)
    }

    /// Runs one full pass. `previous_mode` is kept when no device reports a mode.
    pub fn recompute(&self, registry: &DeviceRegistry, previous_mode: &str) -> Resolution {
        let occupancy = self
            .stations
            .iter()
            .map(|station| {
                let container = registry.get(station).and_then(Device::tray).unwrap_or("");
                (station.clone(), container.to_string())
            })
            .collect();

        let mut operation_mode = previous_mode.to_string();
        let mut trays = BTreeMap::new();

        for (code, device) in registry.iter() {
            if let Some(mode) = device.reported_mode() {
                operation_mode = mode.to_string();
            }

            if !device.children.is_empty() {
                let tracked = device
                    .children
                    .iter()
                    .any(|child| !child.code.is_empty() && registry.contains(&child.code));
                if !tracked {
                    self.collect_children(code, device, &mut trays);
                }
                continue;
            }

            let Some(tray) = device.tray() else { continue };
            if code.starts_with(STATION_PREFIX) || device.is_working() {
                let label = device.display_name().unwrap_or(code).to_string();
                trays.insert(
                    code.to_string(),
                    TraySlot {
                        tray_code: tray.to_string(),
                        device_code: code.to_string(),
                        device_name: label.clone(),
                        location: label,
                    },
                );
            }
        }

        let containers = self.dedupe(&trays);

        Resolution {
            occupancy,
            trays,
            containers,
            operation_mode,
        }
    }

    fn collect_children(
        &self,
        parent_code: &str,
        parent: &Device,
        trays: &mut BTreeMap<String, TraySlot>,
    ) {
        let parent_label = parent.display_name().unwrap_or(parent_code);
        for (index, child) in parent.children.iter().enumerate() {
            let Some(tray) = child.tray() else { continue };
            let key = if child.code.is_empty() {
                format!("{}_child_{}", parent_code, index)
            } else {
                child.code.clone()
            };
            trays.insert(
                key.clone(),
                TraySlot {
                    tray_code: tray.to_string(),
                    device_code: key,
                    device_name: child.display_name().unwrap_or(parent_label).to_string(),
                    location: format!("{}-slot{}", parent_label, index + 1),
                },
            );
        }
    }

    fn dedupe(&self, trays: &BTreeMap<String, TraySlot>) -> Vec<ContainerInfo> {
        let mut by_tray: BTreeMap<&str, &TraySlot> = BTreeMap::new();
        for slot in trays.values() {
            let replace = by_tray
                .get(slot.tray_code.as_str())
                .map_or(true, |existing| self.outranks(slot, existing));
            if replace {
                by_tray.insert(slot.tray_code.as_str(), slot);
            }
        }
        by_tray
            .into_values()
            .map(|slot| ContainerInfo {
                code: slot.tray_code.clone(),
                location: slot.location.clone(),
                device_name: slot.device_name.clone(),
            })
            .collect()
    }

    fn outranks(&self, candidate: &TraySlot, existing: &TraySlot) -> bool {
        let candidate_station = self.is_station(&candidate.device_code);
        let existing_station = self.is_station(&existing.device_code);
        match (candidate_station, existing_station) {
            (true, false) => true,
            (false, true) => false,
            _ => candidate.device_code > existing.device_code,
        }
    }
}
