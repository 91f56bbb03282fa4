//! Library-level settings of the synchronization core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which devices to track and how often to refresh occupied stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Station slot codes (pick/put positions) the dashboard can monitor.
    pub stations: Vec<String>,
    /// Devices polled at startup because they carry station children.
    pub watch_devices: Vec<String>,
    /// Cranes and shuttles whose trays appear in the floor-wide container list.
    pub coordinate_devices: Vec<String>,
    /// Background refresh period for monitored, occupied stations.
    pub refresh_interval_secs: u64,
    /// Capacity of the station change broadcast.
    pub update_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let owned = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        Self {
            stations: owned(&["Tran3001", "Tran3002", "Tran3003", "Tran3004"]),
            watch_devices: owned(&["Crn2002", "TranLine3000"]),
            coordinate_devices: owned(&["Crn2001", "Crn2002", "RGV01"]),
            refresh_interval_secs: 10,
            update_buffer: 256,
        }
    }
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Devices to poll at startup: stations, watch devices, coordinate
    /// devices, first occurrence wins.
    pub fn seed_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for code in self
            .stations
            .iter()
            .chain(&self.watch_devices)
            .chain(&self.coordinate_devices)
        {
            let code = code.trim();
            if !code.is_empty() && !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_codes_are_deduplicated_in_order() {
        let config = SyncConfig::default();
        assert_eq!(
            config.seed_codes(),
            vec![
                "Tran3001",
                "Tran3002",
                "Tran3003",
                "Tran3004",
                "Crn2002",
                "TranLine3000",
                "Crn2001",
                "RGV01"
            ]
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"stations":["Tran3002"],"refreshIntervalSecs":0}"#).unwrap();
        assert_eq!(config.stations, vec!["Tran3002"]);
        assert_eq!(config.watch_devices, SyncConfig::default().watch_devices);
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
    }
}
