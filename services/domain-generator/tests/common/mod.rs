//! In-memory fakes for the forecasting API, the extraction program and the
//! queue.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use domain_generator::{DispatchError, Dispatcher, Pipeline, SeverityFilter};
use forecast_client::{ApiError, ForecastApi};
use hydro_common::{ExtractionJob, InboundMessage, ProductDocument, ReachMetadata, StageFlowSeries};
use storage::{ArtifactStore, Delivery, MessageQueue, QueueError};
use test_utils::fixtures::{
    gauge_json, hml_product, hml_site, product_json, reach_json, stageflow_json,
};

pub const PRODUCT_URL: &str = "https://api.water.noaa.gov/nwps/v1/products/HMLMKX";
pub const WATCHED: [&str; 3] = ["minor", "moderate", "major"];

// ============================================================================
// Forecasting API
// ============================================================================

/// Serves canned JSON keyed by request path. Unknown paths answer 404.
#[derive(Default)]
pub struct FakeForecastApi {
    bodies: HashMap<String, Value>,
    statuses: HashMap<String, u16>,
    /// Statuses answered once, then the path recovers
    statuses_once: Mutex<HashMap<String, u16>>,
    calls: Mutex<Vec<String>>,
}

impl FakeForecastApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, url: &str, product_text: &str) -> Self {
        self.bodies.insert(url.to_string(), product_json(product_text));
        self
    }

    /// Register a site with a forecast, a stage/flow series and a reach.
    pub fn with_site(
        mut self,
        lid: &str,
        reach_id: &str,
        category: &str,
        secondary: f64,
        downstream: &str,
    ) -> Self {
        self.bodies
            .insert(format!("gauges/{}", lid), gauge_json(lid, reach_id, category));
        self.bodies.insert(
            format!("gauges/{}/stageflow/forecast", lid),
            stageflow_json(secondary),
        );
        self.bodies
            .insert(format!("reaches/{}", reach_id), reach_json(reach_id, downstream));
        self
    }

    pub fn with_body(mut self, key: &str, body: Value) -> Self {
        self.bodies.insert(key.to_string(), body);
        self
    }

    pub fn with_status(mut self, key: &str, status: u16) -> Self {
        self.statuses.insert(key.to_string(), status);
        self
    }

    pub fn with_status_once(self, key: &str, status: u16) -> Self {
        self.statuses_once
            .lock()
            .unwrap()
            .insert(key.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn respond(&self, key: String) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(key.clone());

        let once = self.statuses_once.lock().unwrap().remove(&key);
        if let Some(status) = once.or_else(|| self.statuses.get(&key).copied()) {
            return Err(ApiError::Status { url: key, status });
        }

        self.bodies
            .get(&key)
            .cloned()
            .ok_or(ApiError::Status { url: key, status: 404 })
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, key: String) -> Result<T, ApiError> {
        let body = self.respond(key.clone())?;
        serde_json::from_value(body).map_err(|e| ApiError::Decode {
            url: key,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ForecastApi for FakeForecastApi {
    async fn product(&self, url: &str) -> Result<ProductDocument, ApiError> {
        self.decode(url.to_string())
    }

    async fn gauge(&self, lid: &str) -> Result<Bytes, ApiError> {
        let body = self.respond(format!("gauges/{}", lid))?;
        Ok(Bytes::from(body.to_string()))
    }

    async fn stageflow_forecast(&self, lid: &str) -> Result<StageFlowSeries, ApiError> {
        self.decode(format!("gauges/{}/stageflow/forecast", lid))
    }

    async fn reach(&self, reach_id: &str) -> Result<ReachMetadata, ApiError> {
        self.decode(format!("reaches/{}", reach_id))
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Records every job and, like the real program, writes the artifact.
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<ExtractionJob>>,
    skip_artifact: bool,
    delay: Duration,
    failing: HashSet<String>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_artifact(mut self) -> Self {
        self.skip_artifact = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_for(mut self, lid: &str) -> Self {
        self.failing.insert(lid.to_string());
        self
    }

    pub fn jobs(&self) -> Vec<ExtractionJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn lids(&self) -> Vec<String> {
        self.jobs().into_iter().map(|j| j.lid).collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &ExtractionJob) -> Result<(), DispatchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.jobs.lock().unwrap().push(job.clone());

        if self.failing.contains(&job.lid) {
            return Err(DispatchError::Failed {
                code: Some(1),
                stderr: "no path between nodes".to_string(),
            });
        }

        if !self.skip_artifact {
            tokio::fs::write(&job.output_path, b"GPKG").await.unwrap();
        }

        Ok(())
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Default)]
pub struct MemoryQueue {
    pending: VecDeque<Delivery>,
    next_id: u64,
    pub acked: Vec<String>,
    pub nacked: Vec<String>,
    pub keep_alives: usize,
    pub fail_keep_alive: bool,
    pub fail_reads: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_payload(&mut self, payload: &[u8]) -> Delivery {
        self.next_id += 1;
        let delivery = Delivery {
            entry_id: format!("{}-0", self.next_id),
            payload: payload.to_vec(),
            attempts: 0,
        };
        self.pending.push_back(delivery.clone());
        delivery
    }

    pub fn push_message(&mut self, message: &InboundMessage) -> Delivery {
        self.push_payload(message.to_json().unwrap().as_bytes())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        if self.fail_reads {
            return Err(QueueError::Connection("connection refused".to_string()));
        }

        match self.pending.pop_front() {
            Some(delivery) => Ok(Some(delivery)),
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(None)
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        self.acked.push(delivery.entry_id.clone());
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        self.nacked.push(delivery.entry_id.clone());
        self.next_id += 1;
        self.pending.push_back(Delivery {
            entry_id: format!("{}-0", self.next_id),
            payload: delivery.payload.clone(),
            attempts: delivery.attempts + 1,
        });
        Ok(())
    }

    async fn keep_alive(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        if self.fail_keep_alive {
            return Err(QueueError::Channel(format!(
                "entry {} is no longer pending",
                delivery.entry_id
            )));
        }
        self.keep_alives += 1;
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn product_of(ids: &[&str]) -> String {
    let documents: Vec<String> = ids.iter().map(|id| hml_site(id)).collect();
    hml_product(&documents)
}

pub fn pipeline(
    api: Arc<FakeForecastApi>,
    dispatcher: Arc<RecordingDispatcher>,
    output_dir: impl Into<PathBuf>,
) -> Pipeline {
    Pipeline::new(
        api,
        dispatcher,
        SeverityFilter::new(WATCHED),
        ArtifactStore::new(output_dir, "gpkg"),
        PathBuf::from("/data/conus_nextgen.gpkg"),
    )
}
