//! Site forecast and network metadata resolution.
//!
//! Two lookups per site:
//! - the gauge detail, validated into a `SiteForecast` (absence is normal)
//! - the stage/flow status and reach metadata, resolved into the node pair
//!   the extraction program needs

use thiserror::Error;
use tracing::debug;

use forecast_client::{ApiError, ForecastApi};
use hydro_common::network::parse_node_id;
use hydro_common::{NetworkResolution, SiteForecast};

/// Why a site has no usable forecast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsenceReason {
    HttpStatus(u16),
    Transport(String),
    Invalid(String),
}

/// Result of looking up a site's gauge detail.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastLookup {
    Found(Box<SiteForecast>),
    Absent(AbsenceReason),
}

/// Fetch and validate the gauge detail for a site.
///
/// HTTP errors, transport errors and payloads that fail validation all mean
/// "no forecast for this site"; the upstream feed omits fields for sites
/// without an active forecast.
pub async fn resolve_site_forecast(api: &dyn ForecastApi, site_id: &str) -> ForecastLookup {
    let body = match api.gauge(site_id).await {
        Ok(body) => body,
        Err(ApiError::Status { status, .. }) => {
            debug!(site_id = %site_id, status, "No gauge record for site");
            return ForecastLookup::Absent(AbsenceReason::HttpStatus(status));
        }
        Err(e) => {
            debug!(site_id = %site_id, error = %e, "Gauge fetch failed");
            return ForecastLookup::Absent(AbsenceReason::Transport(e.to_string()));
        }
    };

    match SiteForecast::from_json(&body) {
        Ok(forecast) => ForecastLookup::Found(Box::new(forecast)),
        Err(e) => {
            debug!(site_id = %site_id, error = %e, "No forecast for site");
            ForecastLookup::Absent(AbsenceReason::Invalid(e.message))
        }
    }
}

/// Failure to resolve network metadata for a forecast that needs it.
///
/// Distinct from `Ok(None)`, which means the site legitimately has no
/// secondary signal and cannot be extracted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("stage/flow forecast fetch failed: {0}")]
    StageFlow(ApiError),

    #[error("reach metadata fetch failed: {0}")]
    Reach(ApiError),

    #[error("invalid reach identifier {0:?}")]
    InvalidReachId(String),

    #[error("reach {0} declares no downstream reach")]
    MissingDownstream(String),
}

/// Resolve the start/end network nodes for a retained forecast.
pub async fn resolve_network(
    api: &dyn ForecastApi,
    forecast: &SiteForecast,
) -> Result<Option<NetworkResolution>, ResolutionError> {
    let series = api
        .stageflow_forecast(&forecast.lid)
        .await
        .map_err(ResolutionError::StageFlow)?;

    if !series.has_secondary_signal() {
        debug!(lid = %forecast.lid, "No secondary signal, nothing to extract");
        return Ok(None);
    }

    let start_node_id = parse_node_id(&forecast.reach_id)
        .map_err(|_| ResolutionError::InvalidReachId(forecast.reach_id.clone()))?;

    let reach = api
        .reach(forecast.reach_id.trim())
        .await
        .map_err(ResolutionError::Reach)?;

    let downstream = reach
        .first_downstream()
        .ok_or_else(|| ResolutionError::MissingDownstream(forecast.reach_id.clone()))?;

    let end_node_id = parse_node_id(downstream)
        .map_err(|_| ResolutionError::InvalidReachId(downstream.to_string()))?;

    Ok(Some(NetworkResolution {
        lid: forecast.lid.clone(),
        start_node_id,
        end_node_id,
    }))
}
