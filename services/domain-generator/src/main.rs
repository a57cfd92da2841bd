//! Flood domain generator service.
//!
//! Consumes forecast advisory notifications from a Redis stream with:
//! - One message in flight at a time, claim kept alive while processing
//! - Severity filtering and network resolution per forecast site
//! - Artifact-existence deduplication before each extraction
//! - HTTP status API and Prometheus metrics for monitoring

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use domain_generator::config::LoggingConfig;
use domain_generator::server::{self, ServerState};
use domain_generator::{
    AppConfig, CommandDispatcher, ConsumerState, Dispatcher, MessageConsumer, Pipeline,
};
use forecast_client::NwpsClient;
use hydro_common::{ExtractionJob, InboundMessage, NetworkResolution};
use storage::{ArtifactStore, ForecastQueue};

#[derive(Parser, Debug)]
#[command(name = "domain-generator")]
#[command(about = "Flood forecast domain generator")]
struct Args {
    /// Configuration file
    #[arg(long, env = "DOMAIN_GENERATOR_CONFIG", default_value = "config/domain-generator.yaml")]
    config: PathBuf,

    /// Log level (overrides the configuration)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume notifications until interrupted (default)
    Run,

    /// Enqueue a single notification
    Publish {
        /// Product document URL
        #[arg(long)]
        rdf: String,

        #[arg(long)]
        issuance_time: String,
    },

    /// Run one extraction through the configured program
    Extract {
        #[arg(long)]
        start_id: i64,

        #[arg(long)]
        end_id: i64,

        /// Artifact name, normally the site LID
        #[arg(long)]
        filename: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;

    init_tracing(&config.logging, args.log_level.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Publish { rdf, issuance_time } => publish(config, rdf, issuance_time).await,
        Command::Extract {
            start_id,
            end_id,
            filename,
        } => extract(config, start_id, end_id, filename).await,
    }
}

fn init_tracing(logging: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let level = match override_level
        .unwrap_or(logging.level.as_str())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if logging.format == "pretty" {
        tracing::subscriber::set_global_default(builder.pretty().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    }

    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Starting domain generator");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let api = Arc::new(NwpsClient::new(&config.api)?);
    let dispatcher = Arc::new(CommandDispatcher::from_config(&config.extraction));
    let pipeline = Arc::new(Pipeline::from_config(&config, api, dispatcher));
    pipeline.artifacts().ensure_output_dir().await?;

    let mut queue_config = config.queue.connection.clone();
    if queue_config.consumer.trim().is_empty() {
        queue_config.consumer = format!("domain-generator-{}", uuid::Uuid::new_v4());
    }
    info!(
        stream = %queue_config.stream,
        group = %queue_config.group,
        consumer = %queue_config.consumer,
        "Connecting to queue"
    );
    let queue = ForecastQueue::connect(queue_config).await?;

    let state = Arc::new(ConsumerState::new());

    if config.status.enabled {
        let server_state = Arc::new(ServerState {
            consumer: state.clone(),
            watched_categories: config.watch.categories.clone(),
            metrics: Some(prometheus),
        });
        let status_port = config.status.port;
        tokio::spawn(async move {
            if let Err(e) = server::run_server(server_state, status_port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    let mut consumer = MessageConsumer::from_config(queue, pipeline, state.clone(), &config.queue);
    consumer.run(shutdown_rx).await?;

    let snapshot = state.snapshot();
    info!(
        messages_acked = snapshot.messages_acked,
        messages_requeued = snapshot.messages_requeued,
        sites_dispatched = snapshot.sites_dispatched,
        "Domain generator stopped"
    );

    Ok(())
}

async fn publish(config: AppConfig, rdf: String, issuance_time: String) -> Result<()> {
    let message = InboundMessage::new(rdf, issuance_time);

    let mut queue = ForecastQueue::connect(config.queue.connection).await?;
    let entry_id = queue.publish(&message).await?;
    let depth = queue.depth().await?;

    info!(entry_id = %entry_id, rdf = %message.rdf, depth, "Published notification");
    Ok(())
}

async fn extract(config: AppConfig, start_id: i64, end_id: i64, filename: String) -> Result<()> {
    let artifacts = ArtifactStore::new(
        config.extraction.output_dir.clone(),
        config.extraction.artifact_extension.clone(),
    );
    artifacts.ensure_output_dir().await?;
    let output_path = artifacts.artifact_path(&filename)?;

    let job = ExtractionJob::new(
        NetworkResolution {
            lid: filename,
            start_node_id: start_id,
            end_node_id: end_id,
        },
        config.extraction.source_dataset.clone(),
        output_path,
    );

    CommandDispatcher::from_config(&config.extraction)
        .dispatch(&job)
        .await?;

    info!(lid = %job.lid, path = %job.output_path.display(), "Extraction finished");
    Ok(())
}
