//! NWPS REST client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hydro_common::{ProductDocument, ReachMetadata, StageFlowSeries};

use crate::error::ApiError;

/// Read-only view of the forecasting API used by the pipeline.
#[async_trait]
pub trait ForecastApi: Send + Sync {
    /// Fetch the product document a queue message refers to.
    async fn product(&self, url: &str) -> Result<ProductDocument, ApiError>;

    /// Raw gauge detail body. Validation happens at the schema boundary,
    /// not here.
    async fn gauge(&self, lid: &str) -> Result<Bytes, ApiError>;

    /// Stage/flow forecast series for a gauge.
    async fn stageflow_forecast(&self, lid: &str) -> Result<StageFlowSeries, ApiError>;

    /// Network metadata for a reach.
    async fn reach(&self, reach_id: &str) -> Result<ReachMetadata, ApiError>;
}

/// Connection settings for the forecasting API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://api.water.noaa.gov/nwps/v1`
    pub base_url: String,
    /// Value of the `Accept` header sent with every request
    pub accept: String,
    /// Value of the `User-Agent` header sent with every request
    pub user_agent: String,
    /// Optional request timeout; requests wait indefinitely when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// reqwest-backed forecasting API client.
#[derive(Debug, Clone)]
pub struct NwpsClient {
    client: Client,
    base_url: String,
}

impl NwpsClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_str(&config.accept)
                .map_err(|e| ApiError::InvalidConfig(format!("accept header: {}", e)))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone());

        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes, ApiError> {
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ForecastApi for NwpsClient {
    async fn product(&self, url: &str) -> Result<ProductDocument, ApiError> {
        self.get_json(url).await
    }

    async fn gauge(&self, lid: &str) -> Result<Bytes, ApiError> {
        let url = self.endpoint(&format!("gauges/{}", lid));
        self.get_bytes(&url).await
    }

    async fn stageflow_forecast(&self, lid: &str) -> Result<StageFlowSeries, ApiError> {
        let url = self.endpoint(&format!("gauges/{}/stageflow/forecast", lid));
        self.get_json(&url).await
    }

    async fn reach(&self, reach_id: &str) -> Result<ReachMetadata, ApiError> {
        let url = self.endpoint(&format!("reaches/{}", reach_id));
        self.get_json(&url).await
    }
}
