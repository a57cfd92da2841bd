//! Per-message processing pipeline.
//!
//! For one notification: fetch the product, split it into site documents,
//! and run each site through forecast lookup, severity filtering, network
//! resolution, the artifact check and dispatch. Sites are independent; a
//! failure in one is recorded in the summary and the next site proceeds.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info, instrument, warn};

use forecast_client::ForecastApi;
use hml_parser::split_product;
use hydro_common::{ExtractionJob, InboundMessage};
use storage::ArtifactStore;

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::filter::SeverityFilter;
use crate::report::{ProcessingSummary, SiteOutcome, Stage};
use crate::resolver::{resolve_network, resolve_site_forecast, ForecastLookup};

pub struct Pipeline {
    api: Arc<dyn ForecastApi>,
    dispatcher: Arc<dyn Dispatcher>,
    filter: SeverityFilter,
    artifacts: ArtifactStore,
    source_dataset: PathBuf,
}

impl Pipeline {
    pub fn new(
        api: Arc<dyn ForecastApi>,
        dispatcher: Arc<dyn Dispatcher>,
        filter: SeverityFilter,
        artifacts: ArtifactStore,
        source_dataset: PathBuf,
    ) -> Self {
        Self {
            api,
            dispatcher,
            filter,
            artifacts,
            source_dataset,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        api: Arc<dyn ForecastApi>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self::new(
            api,
            dispatcher,
            SeverityFilter::new(&config.watch.categories),
            ArtifactStore::new(
                config.extraction.output_dir.clone(),
                config.extraction.artifact_extension.clone(),
            ),
            config.extraction.source_dataset.clone(),
        )
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Process every site referenced by a notification.
    ///
    /// Never fails: problems are recorded per site. An unreachable product
    /// document yields a single failed entry.
    #[instrument(skip(self, message), fields(rdf = %message.rdf, issuance_time = %message.issuance_time))]
    pub async fn process_message(&self, message: &InboundMessage) -> ProcessingSummary {
        match self.api.product(&message.rdf).await {
            Ok(product) => self.process_product_text(&product.product_text).await,
            Err(e) => {
                error!(error = %e, "Failed to fetch product document");
                let mut summary = ProcessingSummary::default();
                summary.record(
                    0,
                    None,
                    SiteOutcome::Failed {
                        stage: Stage::Product,
                        error: e.to_string(),
                    },
                );
                summary
            }
        }
    }

    /// Process the embedded documents of a product.
    pub async fn process_product_text(&self, product_text: &str) -> ProcessingSummary {
        let mut summary = ProcessingSummary::default();
        let mut seen = HashSet::new();

        for fragment in split_product(product_text) {
            let site = match fragment.record {
                Ok(site) => site,
                Err(e) => {
                    warn!(index = fragment.index, error = %e, "Skipping unparsable site document");
                    counter!("domain_generator_sites_total", "outcome" => "failed").increment(1);
                    summary.record(
                        fragment.index,
                        None,
                        SiteOutcome::Failed {
                            stage: Stage::Parse,
                            error: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let site_id = site.site_id().to_string();
            let outcome = self.process_site(&site_id, &mut seen).await;

            match &outcome {
                SiteOutcome::Failed { stage, error } => {
                    warn!(
                        site_id = %site_id,
                        stage = stage.as_str(),
                        error = %error,
                        "Site failed"
                    );
                }
                other => {
                    info!(site_id = %site_id, outcome = other.label(), "Site processed");
                }
            }
            counter!("domain_generator_sites_total", "outcome" => outcome.label()).increment(1);

            summary.record(fragment.index, Some(site_id), outcome);
        }

        summary
    }

    async fn process_site(&self, site_id: &str, seen: &mut HashSet<String>) -> SiteOutcome {
        let forecast = match resolve_site_forecast(self.api.as_ref(), site_id).await {
            ForecastLookup::Found(forecast) => forecast,
            ForecastLookup::Absent(_) => return SiteOutcome::NoForecast,
        };

        if !self.filter.retains(&forecast) {
            return SiteOutcome::BelowWatch {
                category: forecast.forecast_flood_category.clone(),
            };
        }

        let resolution = match resolve_network(self.api.as_ref(), &forecast).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => return SiteOutcome::NoSecondarySignal,
            Err(e) => {
                return SiteOutcome::Failed {
                    stage: Stage::Metadata,
                    error: e.to_string(),
                }
            }
        };

        // A lid that failed before this point gets another try if it repeats
        if !seen.insert(resolution.lid.clone()) {
            return SiteOutcome::Duplicate;
        }

        let output_path = match self.artifacts.artifact_path(&resolution.lid) {
            Ok(path) => path,
            Err(e) => {
                return SiteOutcome::Failed {
                    stage: Stage::Dedup,
                    error: e.to_string(),
                }
            }
        };

        match self.artifacts.exists(&resolution.lid).await {
            Ok(true) => return SiteOutcome::AlreadyExtracted,
            Ok(false) => {}
            Err(e) => {
                return SiteOutcome::Failed {
                    stage: Stage::Dedup,
                    error: e.to_string(),
                }
            }
        }

        let (start_node_id, end_node_id) = (resolution.start_node_id, resolution.end_node_id);
        let job = ExtractionJob::new(resolution, self.source_dataset.clone(), output_path);

        let started = Instant::now();
        let result = self.dispatcher.dispatch(&job).await;
        histogram!("domain_generator_dispatch_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => SiteOutcome::Dispatched {
                start_node_id,
                end_node_id,
            },
            Err(e) => SiteOutcome::Failed {
                stage: Stage::Dispatch,
                error: e.to_string(),
            },
        }
    }
}
