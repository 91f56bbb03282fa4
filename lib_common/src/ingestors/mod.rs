//! # Data Ingestors Module
//!
//! Clients that bring external device state into the process. Each submodule
//! owns the protocol details of one source and exposes a plain event stream so
//! the consumers never see sockets or frames.
//!
//! ## Contained Modules:
//! - **`wcs_hub`**: A reconnecting WebSocket client for the WCS SignalR hub that
//!   pushes `DeviceDataUpdate` invocations and connection lifecycle changes.

/// The WebSocket client for the WCS device hub.
pub mod wcs_hub;

pub use wcs_hub::{ConnectionState, HubError, HubEvent, WcsHubConfig, WcsHubIngestor};
