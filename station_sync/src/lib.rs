//! # station_sync
//!
//! Live station state for pick/put station dashboards: which container sits on
//! which station, what goods it carries and how many of them are still to be
//! picked. Device events come in from the WCS hub, goods come from the WMS.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod goods;
pub mod live;
pub mod model;
pub mod monitor;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod transition;

pub use config::SyncConfig;
pub use error::SyncError;
pub use goods::{GoodsLoader, LoadMode, LoadOutcome};
pub use live::{run_event_loop, LiveChannelHandler};
pub use model::{ConnectionStatus, Device, GoodsLine, StationState};
pub use resolver::{ContainerInfo, ContainerResolver, Resolution};
pub use service::{SeedReport, StationSync};
pub use sources::{HttpWarehouseApi, WarehouseApi};
pub use transition::Transition;
