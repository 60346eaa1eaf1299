//! adserve: ad slot decision and measurement service.
//!
//! Main entry point that wires the stores, the selection engine, event
//! recording and reporting, then starts the HTTP server.

use adserve_analytics::{Aggregator, ClickHouseSink};
use adserve_api::{ApiServer, AppState};
use adserve_core::config::AppConfig;
use adserve_core::events::EventSink;
use adserve_engine::{AdSelector, EventDispatcher, EventRecorder};
use adserve_store::{Catalog, EventStore, MemoryCandidateStore, MemoryEventLog, MemoryPlacementStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "adserve")]
#[command(about = "Ad slot decision and measurement service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADSERVE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ADSERVE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// JSON catalog of candidates and placement configs to load at boot.
    /// A small demo catalog is used when omitted.
    #[arg(long, env = "ADSERVE_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adserve=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("adserve starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        retention_days = config.events.retention_days,
        export = config.clickhouse.enabled,
        "Configuration loaded"
    );

    // Stores
    let candidates = Arc::new(MemoryCandidateStore::new());
    let placements = Arc::new(MemoryPlacementStore::new());
    let events = Arc::new(MemoryEventLog::new());

    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_path(path)?,
        None => {
            info!("No catalog given, loading demo catalog");
            Catalog::demo()
        }
    };
    let stats = catalog.load_into(candidates.as_ref(), placements.as_ref());
    if stats.candidates_rejected + stats.placements_rejected > 0 {
        warn!(
            candidates_rejected = stats.candidates_rejected,
            placements_rejected = stats.placements_rejected,
            "Some catalog records were rejected"
        );
    }

    // Optional warehouse export
    let sink: Option<Arc<dyn EventSink>> = if config.clickhouse.enabled {
        match ClickHouseSink::new(
            &config.clickhouse,
            config.node_id.clone(),
            config.events.queue_capacity,
        )
        .await
        {
            Ok(sink) => Some(Arc::new(sink) as Arc<dyn EventSink>),
            Err(e) => {
                error!(error = %e, "Failed to connect to ClickHouse, event export disabled");
                None
            }
        }
    } else {
        None
    };

    // Engine
    let selector = Arc::new(AdSelector::new(
        candidates.clone(),
        placements.clone(),
        events.clone(),
        config.selection.clone(),
    ));
    let recorder = Arc::new(EventRecorder::new(candidates.clone(), events.clone()));
    let dispatcher = Arc::new(EventDispatcher::spawn(
        recorder,
        sink,
        config.events.queue_capacity,
    ));
    let aggregator = Arc::new(Aggregator::new(events.clone(), candidates.clone()));

    let state = AppState {
        selector,
        dispatcher,
        aggregator,
        candidates: candidates.clone(),
        events: events.clone(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config.clone(), state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn retention task
    let retention = chrono::Duration::days(i64::from(config.events.retention_days));
    let purge_every = std::time::Duration::from_secs(config.events.purge_interval_secs.max(1));
    let events_for_purge = events.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - retention;
            if let Err(e) = events_for_purge.purge_before(cutoff) {
                error!(error = %e, "Event purge failed");
            }
        }
    });

    info!("adserve is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
