//! # Data Retrieval Module
//!
//! This module provides a centralized location for the HTTP clients used to
//! talk to the warehouse back-ends (WMS for inventory and pick tasks, WCS for
//! device state).
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, featuring automatic retries with exponential
//!   backoff and a per-request timeout.

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiError, ApiResponse};
