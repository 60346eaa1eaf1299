//! REST handlers for slot selection, event intake, reporting and
//! operational probes.

use adserve_analytics::{Aggregator, GroupBy, ReportFilters, ReportFormat, ReportOutput, TopMetric};
use adserve_core::context::SelectionContext;
use adserve_core::events::{DateRange, EventContext, EventType};
use adserve_core::types::CandidateId;
use adserve_core::EngineError;
use adserve_engine::{AdSelector, EventDispatcher};
use adserve_store::{CandidateStore, EventStore};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Upper bound for `limit` on the top-performers report.
const MAX_TOP_LIMIT: usize = 1000;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<AdSelector>,
    pub dispatcher: Arc<EventDispatcher>,
    pub aggregator: Arc<Aggregator>,
    pub candidates: Arc<dyn CandidateStore>,
    pub events: Arc<dyn EventStore>,
    pub node_id: String,
    pub start_time: Instant,
}

/// POST /v1/slots/:position/select: choose the ad for one slot.
///
/// `204` when nothing is eligible; `503` when storage is down so the page
/// can render without the slot.
pub async fn select_ad(
    State(state): State<AppState>,
    Path(position): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ctx: SelectionContext = if body.is_empty() {
        SelectionContext::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            metrics::counter!("api.validation_errors").increment(1);
            ApiError::bad_request("invalid_selection_context", e.to_string())
        })?
    };

    match state.selector.select_ad_for_placement(&position, &ctx)? {
        Some(ad) => Ok(Json(ad).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Body of an event post: the candidate plus the caller's context.
#[derive(Debug, Deserialize)]
pub struct EventIngest {
    pub candidate_id: CandidateId,
    #[serde(flatten)]
    pub context: EventContext,
}

/// POST /v1/events/:event_type: fire-and-forget event intake.
///
/// Always answers `202`: recording must never fail the caller's render.
/// Malformed input is logged and counted instead.
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    body: Bytes,
) -> StatusCode {
    let event_type = match event_type.parse::<EventType>() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Ignoring event with unknown type");
            metrics::counter!("api.invalid_events").increment(1);
            return StatusCode::ACCEPTED;
        }
    };
    match serde_json::from_slice::<EventIngest>(&body) {
        Ok(ingest) => {
            state
                .dispatcher
                .dispatch(ingest.candidate_id, event_type, ingest.context);
        }
        Err(e) => {
            warn!(event_type = %event_type.as_str(), error = %e, "Ignoring malformed event body");
            metrics::counter!("api.invalid_events").increment(1);
        }
    }
    StatusCode::ACCEPTED
}

/// Optional `from`/`to` bounds shared by the report endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RangeQuery {
    fn range(&self) -> Option<DateRange> {
        if self.from.is_none() && self.to.is_none() {
            return None;
        }
        Some(DateRange {
            from: self.from,
            to: self.to,
        })
    }
}

/// GET /v1/reports/candidates/:id/summary
pub async fn candidate_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.aggregator.summary(id, q.range())?))
}

/// GET /v1/reports/candidates/:id/placements
pub async fn candidate_placements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.aggregator.performance_by_placement(id, q.range())?))
}

/// GET /v1/reports/candidates/:id/reconcile
pub async fn candidate_reconcile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.aggregator.reconcile(id)? {
        Some(r) => Ok(Json(r)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "candidate_not_found",
            format!("no candidate {id}"),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    #[serde(default = "default_top_limit")]
    pub limit: usize,
    #[serde(default)]
    pub metric: TopMetric,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn default_top_limit() -> usize {
    10
}

/// GET /v1/reports/top
pub async fn top_performers(
    State(state): State<AppState>,
    Query(q): Query<TopQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = RangeQuery {
        from: q.from,
        to: q.to,
    }
    .range();
    let rows = state
        .aggregator
        .top_performers(q.limit.min(MAX_TOP_LIMIT), q.metric, range)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_by: GroupBy,
}

/// GET /v1/reports/revenue
pub async fn revenue(
    State(state): State<AppState>,
    Query(q): Query<RevenueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange {
        from: q.from,
        to: q.to,
    };
    Ok(Json(state.aggregator.revenue_by_period(range, q.group_by)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub format: ReportFormat,
}

/// POST /v1/reports: JSON rows or a `text/csv` export.
pub async fn build_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Response, ApiError> {
    let output = state.aggregator.report(&request.filters, request.format)?;
    Ok(match output {
        ReportOutput::Structured(rows) => Json(rows).into_response(),
        ReportOutput::Tabular(csv) => {
            ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response()
        }
    })
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        events_retained: state.events.len(),
    })
}

/// GET /ready: Readiness probe. Ready once the candidate store answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.candidates.get(&Uuid::nil()) {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub events_retained: usize,
}

/// Error half of handler results: a status plus an [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.to_string(),
            message: message.into(),
        }
    }

    fn bad_request(error: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        if e.is_unavailable() {
            warn!(error = %e, "Storage unavailable");
            metrics::counter!("api.unavailable").increment(1);
            return Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "Storage temporarily unavailable");
        }
        match e {
            EngineError::Validation(msg) => Self::bad_request("invalid_request", msg),
            other => {
                error!(error = %other, "Request failed");
                metrics::counter!("api.errors").increment(1);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal processing error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}
