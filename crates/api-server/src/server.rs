//! API server: REST routes plus the Prometheus exporter.

use crate::rest::{self, AppState};
use adserve_core::config::AppConfig;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Slot decisions and event intake
        .route("/v1/slots/:position/select", post(rest::select_ad))
        .route("/v1/events/:event_type", post(rest::ingest_event))
        // Reporting
        .route("/v1/reports", post(rest::build_report))
        .route("/v1/reports/top", get(rest::top_performers))
        .route("/v1/reports/revenue", get(rest::revenue))
        .route("/v1/reports/candidates/:id/summary", get(rest::candidate_summary))
        .route("/v1/reports/candidates/:id/placements", get(rest::candidate_placements))
        .route("/v1/reports/candidates/:id/reconcile", get(rest::candidate_reconcile))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics exporter on its own port. Must run inside the
    /// tokio runtime.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
