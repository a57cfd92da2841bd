//! Forecasting API client.
//!
//! Provides:
//! - `ForecastApi`, the seam the pipeline depends on
//! - `NwpsClient`, the reqwest implementation against the NWPS REST API

pub mod client;
pub mod error;

pub use client::{ClientConfig, ForecastApi, NwpsClient};
pub use error::ApiError;
