//! Gauge detail schema returned by the forecasting API.
//!
//! Only the fields listed here are validated; anything else in the payload
//! is ignored. A payload missing any required field is rejected as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A gauge payload that does not match the expected schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("gauge payload failed validation: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Validated forecast for a single gauge site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteForecast {
    pub lid: String,
    pub usgs_id: String,
    pub reach_id: String,
    pub name: String,
    pub description: String,
    pub rfc: Office,
    pub wfo: Office,
    pub state: Office,
    pub county: String,
    pub time_zone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pedts: Pedts,
    pub status: GaugeStatus,
    pub flood: Flood,
    pub upstream_lid: String,
    pub downstream_lid: String,
    pub in_service: InService,
    pub forecast_reliability: String,
    #[serde(rename = "ObservedFloodCategory")]
    pub observed_flood_category: String,
    #[serde(rename = "ForecastFloodCategory")]
    pub forecast_flood_category: String,
}

impl SiteForecast {
    /// Parse and validate a raw gauge detail body.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let forecast: SiteForecast =
            serde_json::from_slice(body).map_err(|e| ValidationError::new(e.to_string()))?;
        forecast.validate()?;
        Ok(forecast)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.lid.trim().is_empty() {
            return Err(ValidationError::new("lid is empty"));
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(ValidationError::new("coordinates are not finite"));
        }
        Ok(())
    }
}

/// River forecast center, forecast office, or state reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub abbreviation: String,
    pub name: String,
}

/// Physical element / data type / source codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pedts {
    pub observed: String,
    pub forecast: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeStatus {
    pub observed: StatusReading,
    pub forecast: StatusReading,
}

/// One observed or forecast reading in the gauge status block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReading {
    pub primary: f64,
    pub primary_unit: String,
    pub secondary: f64,
    pub secondary_unit: String,
    pub flood_category: String,
    pub valid_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flood {
    pub stage_units: String,
    pub flow_units: String,
    pub categories: FloodCategories,
    pub impacts: Vec<Impact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodCategories {
    pub major: CategoryThreshold,
    pub moderate: CategoryThreshold,
    pub minor: CategoryThreshold,
    pub action: CategoryThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryThreshold {
    pub stage: f64,
    pub flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub stage: f64,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InService {
    pub enabled: bool,
    pub message: String,
}
