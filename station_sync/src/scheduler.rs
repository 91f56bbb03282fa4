//! # Station Refresh Scheduler
//!
//! One background refresh per monitored, occupied station. Each timer is an
//! explicit `RefreshHandle` holding the container it was started for and a
//! cancellation token, so the validity check on every tick is a field read.
//!
//! On each tick the timer re-validates that the station is still monitored and
//! still holds the same container. If not, it removes itself without any other
//! side effect. Otherwise it re-runs the goods fetch silently (no loading flag).

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::goods::LoadMode;
use crate::service::StationSync;

/// A running refresh timer.
#[derive(Debug)]
pub struct RefreshHandle {
    /// Container the timer refreshes.
    pub container: String,
    id: u64,
    cancel: CancellationToken,
}

/// Station code -> running timer.
#[derive(Debug, Default)]
pub struct RefreshTimers {
    handles: HashMap<String, RefreshHandle>,
    next_id: u64,
}

impl RefreshTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer for `station`, cancelling any timer already there.
    /// Returns the new timer's id and token for the task that drives it.
    pub fn start(&mut self, station: &str, container: &str) -> (u64, CancellationToken) {
        if let Some(previous) = self.handles.remove(station) {
            tracing::debug!(station, container = %previous.container, "replacing refresh timer");
            previous.cancel.cancel();
        }
        self.next_id += 1;
        let cancel = CancellationToken::new();
        self.handles.insert(
            station.to_string(),
            RefreshHandle {
                container: container.to_string(),
                id: self.next_id,
                cancel: cancel.clone(),
            },
        );
        (self.next_id, cancel)
    }

    /// Cancels and removes the timer of `station`.
    pub fn stop(&mut self, station: &str) -> bool {
        match self.handles.remove(station) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes the timer of `station` only if it is still the one with `id`.
    pub fn retire(&mut self, station: &str, id: u64) -> bool {
        if self.handles.get(station).map(|h| h.id) == Some(id) {
            self.stop(station)
        } else {
            false
        }
    }

    /// Cancels every timer. Returns how many were running.
    pub fn stop_all(&mut self) -> usize {
        let count = self.handles.len();
        for (_, handle) in self.handles.drain() {
            handle.cancel.cancel();
        }
        count
    }

    /// `true` when timer `id` is the current one for `station` and targets `container`.
    pub fn is_current(&self, station: &str, container: &str, id: u64) -> bool {
        self.handles
            .get(station)
            .is_some_and(|h| h.id == id && h.container == container)
    }

    pub fn get(&self, station: &str) -> Option<&RefreshHandle> {
        self.handles.get(station)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Drives one timer until it is cancelled or finds itself stale.
pub(crate) async fn refresh_loop(
    sync: StationSync,
    station: String,
    container: String,
    id: u64,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(
                    station = %station,
                    container = %container,
                    "refresh timer cancelled"
                );
                return;
            }
            _ = ticker.tick() => {}
        }

        if !sync.refresh_target_valid(&station, &container, id) {
            sync.retire_timer(&station, id);
            tracing::debug!(station = %station, container = %container, "refresh timer retired");
            return;
        }

        tracing::trace!(station = %station, container = %container, "background refresh");
        sync.run_load(&station, &container, LoadMode::Background).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_replaces_and_cancels_previous() {
        let mut timers = RefreshTimers::new();
        let (first_id, first) = timers.start("Tran3001", "C1");
        let (second_id, second) = timers.start("Tran3001", "C2");
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_ne!(first_id, second_id);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.get("Tran3001").map(|h| h.container.as_str()), Some("C2"));
        assert!(timers.is_current("Tran3001", "C2", second_id));
        assert!(!timers.is_current("Tran3001", "C1", first_id));
    }

    #[test]
    fn retire_only_removes_matching_timer() {
        let mut timers = RefreshTimers::new();
        let (old_id, _) = timers.start("Tran3002", "C1");
        let (new_id, token) = timers.start("Tran3002", "C2");
        assert!(!timers.retire("Tran3002", old_id));
        assert!(!token.is_cancelled());
        assert!(timers.retire("Tran3002", new_id));
        assert!(token.is_cancelled());
        assert!(timers.is_empty());
    }

    #[test]
    fn stop_all_cancels_everything() {
        let mut timers = RefreshTimers::new();
        let (_, a) = timers.start("Tran3001", "C1");
        let (_, b) = timers.start("Tran3003", "C3");
        assert_eq!(timers.stop_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(!timers.stop("Tran3001"));
    }
}
