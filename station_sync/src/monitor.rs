//! # Station Monitor Set
//!
//! Stations the dashboard currently shows. Membership gates every fetch and
//! every refresh timer.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct MonitorSet {
    stations: BTreeSet<String>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the station was already registered.
    pub fn register(&mut self, station: &str) -> bool {
        self.stations.insert(station.to_string())
    }

    /// Returns `false` when the station was not registered.
    pub fn unregister(&mut self, station: &str) -> bool {
        self.stations.remove(station)
    }

    pub fn contains(&self, station: &str) -> bool {
        self.stations.contains(station)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.stations.clear();
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_are_idempotent() {
        let mut set = MonitorSet::new();
        assert!(set.register("Tran3002"));
        assert!(!set.register("Tran3002"));
        assert!(set.register("Tran3003"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Tran3002", "Tran3003"]);
        assert!(set.unregister("Tran3002"));
        assert!(!set.unregister("Tran3002"));
        assert!(!set.contains("Tran3002"));
        set.clear();
        assert!(set.is_empty());
    }
}
