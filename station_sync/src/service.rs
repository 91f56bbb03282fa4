//! # Station Sync Service
//!
//! The live-state core. One `StationSync` is constructed by the composition
//! root and shared (it is a cheap `Clone` over an `Arc`) with the live channel
//! pump, the refresh timers and the UI layer.
//!
//! ## Flow
//! device update -> registry -> resolver pass -> per-station transition ->
//! goods fetch + refresh timer -> published `StationState` snapshot.
//!
//! All in-memory state sits behind one mutex that is never held across an
//! await. Network fetches run unlocked; when their result comes back the
//! station's occupancy is checked again and a result for a container that is
//! no longer current is discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::future::join_all;
use lib_common::ingestors::ConnectionState;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::goods::{GoodsLoader, LoadMode};
use crate::model::{is_vacant, ConnectionStatus, Device, StationState};
use crate::monitor::MonitorSet;
use crate::registry::DeviceRegistry;
use crate::resolver::{ContainerInfo, ContainerResolver, Resolution};
use crate::scheduler::{refresh_loop, RefreshTimers};
use crate::sources::WarehouseApi;
use crate::transition::{classify, Transition};

/// Outcome of the startup device poll.
#[derive(Debug, Default)]
pub struct SeedReport {
    /// Devices stored in the registry.
    pub seeded: Vec<String>,
    /// Devices that could not be fetched or validated, with the reason.
    pub failed: Vec<(String, SyncError)>,
}

#[derive(Debug)]
struct PendingLoad {
    station: String,
    container: String,
}

struct Core {
    registry: DeviceRegistry,
    resolution: Resolution,
    monitored: MonitorSet,
    stations: BTreeMap<String, StationState>,
    timers: RefreshTimers,
    connection: ConnectionStatus,
    /// Stations changed since the last publish.
    dirty: BTreeSet<String>,
}

impl Core {
    fn touch(&mut self, station: &str) -> Option<&mut StationState> {
        let state = self.stations.get_mut(station)?;
        self.dirty.insert(station.to_string());
        Some(state)
    }
}

struct Shared {
    config: SyncConfig,
    api: Arc<dyn WarehouseApi>,
    loader: GoodsLoader,
    resolver: ContainerResolver,
    core: Mutex<Core>,
    updates: broadcast::Sender<Arc<StationState>>,
}

#[derive(Clone)]
pub struct StationSync {
    shared: Arc<Shared>,
}

impl StationSync {
    pub fn new(config: SyncConfig, api: Arc<dyn WarehouseApi>) -> Self {
        let resolver = ContainerResolver::new(config.stations.clone());
        let stations = config
            .stations
            .iter()
            .map(|code| (code.clone(), StationState::new(code)))
            .collect();
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));

        let core = Core {
            registry: DeviceRegistry::new(),
            resolution: Resolution::empty(&config.stations),
            monitored: MonitorSet::new(),
            stations,
            timers: RefreshTimers::new(),
            connection: ConnectionStatus::default(),
            dirty: BTreeSet::new(),
        };

        Self {
            shared: Arc::new(Shared {
                loader: GoodsLoader::new(Arc::clone(&api)),
                config,
                api,
                resolver,
                core: Mutex::new(core),
                updates,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends one snapshot per changed station.
    fn flush(&self, core: &mut Core) {
        for station in std::mem::take(&mut core.dirty) {
            if let Some(state) = core.stations.get(&station) {
                // No receivers is fine: the UI may poll instead.
                let _ = self.shared.updates.send(Arc::new(state.clone()));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ingestion
    // ─────────────────────────────────────────────────────────────────────

    /// Polls every configured device once and stores what comes back.
    /// A failing device is logged and skipped; the others are still seeded.
    pub async fn seed_devices(&self) -> SeedReport {
        let mut report = SeedReport::default();

        for code in self.shared.config.seed_codes() {
            let device = match self.shared.api.fetch_device(&code).await {
                Ok(payload) => Device::from_payload(&code, &payload),
                Err(e) => Err(e),
            };
            match device {
                Ok(device) => {
                    let key = device.code.clone();
                    self.lock().registry.apply_update(&key, device);
                    report.seeded.push(code);
                }
                Err(e) => {
                    tracing::warn!(device = %code, error = %e, "device seeding failed");
                    if let Some(state) = self.lock().touch(&code) {
                        state.error_message = e.to_string();
                    }
                    report.failed.push((code, e));
                }
            }
        }

        let loads = {
            let mut core = self.lock();
            let loads = self.reconcile(&mut core);
            self.flush(&mut core);
            loads
        };
        tracing::info!(
            seeded = report.seeded.len(),
            failed = report.failed.len(),
            "device registry seeded"
        );
        self.run_loads(loads, LoadMode::Foreground).await;
        report
    }

    /// Applies one `DeviceDataUpdate` and waits for the goods fetches it
    /// triggers.
    ///
    /// Malformed payloads are rejected before they reach the registry.
    pub async fn apply_device_update(&self, code: &str, payload: &Value) -> Result<(), SyncError> {
        let loads = self.ingest(code, payload)?;
        self.run_loads(loads, LoadMode::Foreground).await;
        Ok(())
    }

    /// Applies one `DeviceDataUpdate` and starts the goods fetches it
    /// triggers in the background. Returns how many were started.
    ///
    /// Occupancy and transitions are settled before this returns, so the next
    /// event never waits on the network.
    pub fn dispatch_device_update(&self, code: &str, payload: &Value) -> Result<usize, SyncError> {
        let loads = self.ingest(code, payload)?;
        let started = loads.len();
        for load in loads {
            let sync = self.clone();
            tokio::spawn(async move {
                sync.run_load(&load.station, &load.container, LoadMode::Foreground)
                    .await;
            });
        }
        Ok(started)
    }

    /// Stores the device and reconciles. Returns the fetches to run.
    fn ingest(&self, code: &str, payload: &Value) -> Result<Vec<PendingLoad>, SyncError> {
        let device = Device::from_payload(code, payload).map_err(|e| {
            tracing::warn!(device = code, error = %e, "device update rejected");
            e
        })?;

        let mut core = self.lock();
        if !core.registry.apply_update(code, device) {
            tracing::trace!(device = code, "device update without changes");
            return Ok(Vec::new());
        }
        let loads = self.reconcile(&mut core);
        self.flush(&mut core);
        Ok(loads)
    }

    /// Records a live channel lifecycle change.
    pub fn on_connection_state(&self, state: ConnectionState) {
        tracing::info!(state = state.label(), "live channel state");
        self.lock().connection.wcs = state;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────

    /// Recomputes the resolution from the registry and reacts to every
    /// station whose occupancy changed. Returns the fetches to run.
    fn reconcile(&self, core: &mut Core) -> Vec<PendingLoad> {
        let resolution = self
            .shared
            .resolver
            .recompute(&core.registry, &core.resolution.operation_mode);
        self.update_station_names(core);

        let mut loads = Vec::new();
        for station in self.shared.resolver.stations() {
            let transition = classify(
                core.resolution.container_at(station),
                resolution.container_at(station),
            );
            if transition == Transition::Unchanged {
                continue;
            }
            if !core.monitored.contains(station) {
                tracing::debug!(
                    station = %station,
                    ?transition,
                    "occupancy changed on unmonitored station"
                );
                continue;
            }
            if let Some(container) = transition.departing() {
                self.depart(core, station, container);
            }
            if let Some(container) = transition.arriving() {
                loads.push(self.arrive(core, station, container, false));
            }
        }

        if resolution.operation_mode != core.resolution.operation_mode {
            tracing::info!(mode = %resolution.operation_mode, "operation mode changed");
        }
        core.resolution = resolution;
        loads
    }

    fn update_station_names(&self, core: &mut Core) {
        let Core {
            registry,
            stations,
            dirty,
            ..
        } = core;
        for (code, state) in stations.iter_mut() {
            if let Some(name) = registry.get(code).and_then(Device::display_name) {
                if state.station_name != name {
                    state.station_name = name.to_string();
                    dirty.insert(code.clone());
                }
            }
        }
    }

    fn depart(&self, core: &mut Core, station: &str, container: &str) {
        core.timers.stop(station);
        if let Some(state) = core.touch(station) {
            state.current_container.clear();
            state.local_goods.clear();
            state.error_message.clear();
            state.is_loading = false;
            state.last_loaded = None;
        }
        tracing::info!(station, container, "container departed");
    }

    /// Marks `container` current on `station` and starts its refresh timer.
    /// `keep_goods` leaves the previous goods visible while reloading the same
    /// container.
    fn arrive(
        &self,
        core: &mut Core,
        station: &str,
        container: &str,
        keep_goods: bool,
    ) -> PendingLoad {
        if let Some(state) = core.touch(station) {
            if !keep_goods {
                state.local_goods.clear();
            }
            state.current_container = container.to_string();
            state.error_message.clear();
            state.is_loading = true;
        }

        let (id, cancel) = core.timers.start(station, container);
        tokio::spawn(refresh_loop(
            self.clone(),
            station.to_string(),
            container.to_string(),
            id,
            cancel,
            self.shared.config.refresh_interval(),
        ));
        tracing::info!(station, container, "container arrived");

        PendingLoad {
            station: station.to_string(),
            container: container.to_string(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Goods
    // ─────────────────────────────────────────────────────────────────────

    async fn run_loads(&self, loads: Vec<PendingLoad>, mode: LoadMode) {
        join_all(
            loads
                .iter()
                .map(|load| self.run_load(&load.station, &load.container, mode)),
        )
        .await;
    }

    /// Fetches goods for `container` and applies them to `station` if the
    /// container is still the station's current one.
    pub(crate) async fn run_load(&self, station: &str, container: &str, mode: LoadMode) {
        let Some(outcome) = self.shared.loader.fetch(container).await else {
            return;
        };

        let mut core = self.lock();
        core.connection.wms = if outcome.wms_reachable {
            ConnectionState::Connected
        } else {
            let reason = outcome.goods.as_ref().err().map(ToString::to_string);
            ConnectionState::Error(reason.unwrap_or_default())
        };

        let still_current = core.resolution.container_at(station) == container
            && core
                .stations
                .get(station)
                .is_some_and(|state| state.current_container == container);
        if !still_current {
            let stale = SyncError::Stale {
                station: station.to_string(),
                container: container.to_string(),
            };
            tracing::debug!(reason = %stale, "goods response discarded");
            // Left behind by unregister: the container moved on while unmonitored.
            let stuck = mode == LoadMode::Foreground
                && core.stations.get(station).is_some_and(|state| {
                    state.current_container == container && state.is_loading
                });
            if stuck {
                if let Some(state) = core.touch(station) {
                    state.is_loading = false;
                }
                self.flush(&mut core);
            }
            return;
        }

        if let Some(state) = core.touch(station) {
            match outcome.goods {
                Ok(goods) => {
                    state.local_goods = goods;
                    state.error_message.clear();
                }
                Err(e) => {
                    tracing::warn!(station, container, error = %e, "goods manifest unavailable");
                    state.local_goods.clear();
                    state.error_message = e.to_string();
                }
            }
            state.last_loaded = Some(Utc::now());
            if mode == LoadMode::Foreground {
                state.is_loading = false;
            }
        }
        self.flush(&mut core);
    }

    /// Loads goods for the container currently on `station`, toggling the
    /// loading flag. Vacant codes are ignored.
    pub async fn load_goods(&self, station: &str, container: &str) {
        if is_vacant(container) {
            return;
        }
        {
            let mut core = self.lock();
            if let Some(state) = core.touch(station) {
                if state.current_container == container {
                    state.is_loading = true;
                }
            }
            self.flush(&mut core);
        }
        self.run_load(station, container, LoadMode::Foreground).await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Refresh timers
    // ─────────────────────────────────────────────────────────────────────

    /// `true` while timer `id` should keep refreshing `container` on `station`.
    pub(crate) fn refresh_target_valid(&self, station: &str, container: &str, id: u64) -> bool {
        let core = self.lock();
        core.monitored.contains(station)
            && core.resolution.container_at(station) == container
            && core.timers.is_current(station, container, id)
    }

    pub(crate) fn retire_timer(&self, station: &str, id: u64) {
        self.lock().timers.retire(station, id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Published surface
    // ─────────────────────────────────────────────────────────────────────

    /// Starts tracking `station`. Returns `Ok(false)` when it already was.
    ///
    /// If the station is occupied right now, the arrival is handled
    /// immediately rather than on the next device event.
    pub async fn register_monitored_station(&self, station: &str) -> Result<bool, SyncError> {
        let loads = {
            let mut core = self.lock();
            if !self.shared.resolver.is_station(station) {
                tracing::warn!(station, "cannot monitor unknown station");
                return Err(SyncError::UnknownStation(station.to_string()));
            }
            if !core.monitored.register(station) {
                tracing::debug!(station, "station already monitored");
                return Ok(false);
            }
            tracing::info!(station, "station monitored");

            let container = core.resolution.container_at(station).to_string();
            let held = core
                .stations
                .get(station)
                .map(|state| state.current_container.clone())
                .unwrap_or_default();

            let mut loads = Vec::new();
            if is_vacant(&container) {
                if !held.is_empty() {
                    self.depart(&mut core, station, &held);
                }
            } else {
                loads.push(self.arrive(&mut core, station, &container, held == container));
            }
            self.flush(&mut core);
            loads
        };
        self.run_loads(loads, LoadMode::Foreground).await;
        Ok(true)
    }

    /// Stops tracking `station`. Its last state stays visible. Returns `false`
    /// when it was not monitored.
    pub fn unregister_monitored_station(&self, station: &str) -> bool {
        let mut core = self.lock();
        if !core.monitored.unregister(station) {
            tracing::debug!(station, "station was not monitored");
            return false;
        }
        core.timers.stop(station);
        tracing::info!(station, "station no longer monitored");
        true
    }

    /// Manual refresh: clears monitored stations' errors, recomputes from the
    /// registry and reloads goods for every monitored occupied station.
    pub async fn refresh_data(&self) {
        let loads = {
            let mut core = self.lock();
            let monitored: Vec<String> = core.monitored.iter().map(str::to_string).collect();
            for station in &monitored {
                if let Some(state) = core.touch(station) {
                    state.error_message.clear();
                }
            }

            let mut loads = self.reconcile(&mut core);
            for station in &monitored {
                if loads.iter().any(|load| &load.station == station) {
                    continue;
                }
                let container = core.resolution.container_at(station).to_string();
                if is_vacant(&container) {
                    continue;
                }
                if let Some(state) = core.touch(station) {
                    state.is_loading = true;
                }
                loads.push(PendingLoad {
                    station: station.clone(),
                    container,
                });
            }
            self.flush(&mut core);
            loads
        };
        tracing::debug!(loads = loads.len(), "manual refresh");
        self.run_loads(loads, LoadMode::Foreground).await;
    }

    /// Stops every refresh timer and clears the monitored set. Must be called
    /// when the core shuts down.
    pub fn cleanup(&self) {
        let mut core = self.lock();
        let stopped = core.timers.stop_all();
        core.monitored.clear();
        tracing::info!(stopped, "station sync cleaned up");
    }

    /// Snapshot of one station. `None` for codes that are not station slots.
    pub fn get_station_state(&self, station: &str) -> Option<StationState> {
        self.lock().stations.get(station).cloned()
    }

    /// Snapshots of every station slot, ordered by code.
    pub fn station_states(&self) -> Vec<StationState> {
        self.lock().stations.values().cloned().collect()
    }

    /// Receives a snapshot after every change of any station.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StationState>> {
        self.shared.updates.subscribe()
    }

    pub fn is_monitored(&self, station: &str) -> bool {
        self.lock().monitored.contains(station)
    }

    pub fn monitored_stations(&self) -> Vec<String> {
        self.lock().monitored.iter().map(str::to_string).collect()
    }

    /// Resolved container on `station` (`""` when vacant), regardless of monitoring.
    pub fn occupancy(&self, station: &str) -> Option<String> {
        self.lock().resolution.occupancy.get(station).cloned()
    }

    /// Distinct containers currently visible anywhere on the floor.
    pub fn containers(&self) -> Vec<ContainerInfo> {
        self.lock().resolution.containers.clone()
    }

    pub fn operation_mode(&self) -> String {
        self.lock().resolution.operation_mode.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().connection.clone()
    }

    /// Last stored record of a device.
    pub fn device(&self, code: &str) -> Option<Device> {
        self.lock().registry.get(code).cloned()
    }

    /// `true` when `station` has a running refresh timer.
    pub fn has_refresh_timer(&self, station: &str) -> bool {
        self.lock().timers.get(station).is_some()
    }

    /// Number of running refresh timers.
    pub fn refresh_timer_count(&self) -> usize {
        self.lock().timers.len()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }
}
