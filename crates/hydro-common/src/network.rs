//! Hydrologic network payloads and the extraction job they resolve to.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HydroError, HydroResult};

/// Secondary value reported when a gauge has no secondary (flow) signal.
pub const NO_DATA_SENTINEL: f64 = -999.0;

/// Stage/flow forecast series for a gauge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFlowSeries {
    #[serde(default)]
    pub data: Vec<StageFlowEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFlowEntry {
    pub secondary: f64,
    #[serde(default)]
    pub primary: Option<f64>,
    #[serde(default)]
    pub valid_time: Option<String>,
    #[serde(default)]
    pub generated_time: Option<String>,
}

impl StageFlowSeries {
    /// True when the series has a usable secondary value in its first entry.
    ///
    /// Only the exact sentinel counts as missing; any other number,
    /// including zero and values next to the sentinel, is a real reading.
    #[allow(clippy::float_cmp)]
    pub fn has_secondary_signal(&self) -> bool {
        match self.data.first() {
            Some(entry) => entry.secondary != NO_DATA_SENTINEL,
            None => false,
        }
    }
}

/// Reach metadata from the network API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachMetadata {
    pub route: ReachRoute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachRoute {
    #[serde(default)]
    pub upstream: Vec<RouteReach>,
    #[serde(default)]
    pub downstream: Vec<RouteReach>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReach {
    pub reach_id: String,
}

impl ReachMetadata {
    /// The first declared downstream reach, if any.
    pub fn first_downstream(&self) -> Option<&str> {
        self.route.downstream.first().map(|r| r.reach_id.as_str())
    }
}

/// Parse a reach (network node) identifier.
pub fn parse_node_id(raw: &str) -> HydroResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| HydroError::InvalidReachId(raw.to_string()))
}

/// Start/end network nodes resolved for a forecast site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResolution {
    pub lid: String,
    pub start_node_id: i64,
    pub end_node_id: i64,
}

/// A request to the external extraction program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub lid: String,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub source_dataset: PathBuf,
    pub output_path: PathBuf,
}

impl ExtractionJob {
    pub fn new(
        resolution: NetworkResolution,
        source_dataset: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            lid: resolution.lid,
            start_node_id: resolution.start_node_id,
            end_node_id: resolution.end_node_id,
            source_dataset,
            output_path,
        }
    }

    /// Output name handed to the extraction program (the site identifier).
    pub fn job_name(&self) -> &str {
        &self.lid
    }
}
