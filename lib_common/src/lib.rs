//! # lib_common
//!
//! Shared plumbing used by the station monitor crates. Each top-level folder is
//! gated behind a cargo feature of the same name so that consumers only pull in
//! the dependencies they actually need.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// WebSocket ingestion of the WCS device hub.
#[cfg(feature = "ingestors")]
pub mod ingestors;
/// Console + rolling file logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;
/// Generic HTTP API client with retry middleware.
#[cfg(feature = "retrieve")]
pub mod retrieve;
