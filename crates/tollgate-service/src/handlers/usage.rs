//! Usage reporting handlers.
//!
//! Reporting never fails once the caller is authenticated: unknown providers
//! and ledger outages are logged by the tracker and the report is still
//! acknowledged with `202 Accepted`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tollgate_core::{EventId, UsageContext, UsageEvent};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Maximum number of events in one batch.
pub const MAX_BATCH_EVENTS: usize = 1_000;

/// One usage report from a collector.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Provider name.
    pub provider: String,
    /// Endpoint name or wire path.
    pub endpoint: String,
    /// Units consumed (default 1).
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    /// Optional call details.
    #[serde(flatten)]
    pub context: UsageContext,
}

const fn default_quantity() -> u64 {
    1
}

/// Acknowledgement of one usage report.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Ledger event id.
    pub event_id: EventId,
    /// Provider name.
    pub provider: String,
    /// Resolved endpoint name.
    pub endpoint: String,
    /// Units recorded.
    pub quantity: u64,
    /// Computed cost.
    #[serde(with = "tollgate_core::money::usd")]
    pub cost: i64,
    /// Whether the provider or endpoint was unknown.
    pub unrecognized: bool,
}

impl From<&UsageEvent> for UsageResponse {
    fn from(event: &UsageEvent) -> Self {
        Self {
            event_id: event.event_id,
            provider: event.provider.clone(),
            endpoint: event.endpoint.clone(),
            quantity: event.quantity,
            cost: event.cost_micros,
            unrecognized: event.unrecognized,
        }
    }
}

/// Batch usage request.
#[derive(Debug, Deserialize)]
pub struct BatchUsageRequest {
    /// Reports, recorded in order.
    pub events: Vec<UsageRequest>,
}

/// Batch usage response.
#[derive(Debug, Serialize)]
pub struct BatchUsageResponse {
    /// Number of reports recorded.
    pub accepted: usize,
    /// Number of reports for unknown providers or endpoints.
    pub unrecognized: usize,
    /// Summed cost of the batch.
    #[serde(with = "tollgate_core::money::usd")]
    pub total_cost: i64,
    /// Per-report acknowledgements, in request order.
    pub results: Vec<UsageResponse>,
}

fn record(state: &AppState, auth: &ServiceAuth, request: UsageRequest) -> UsageEvent {
    let mut context = request.context;
    if context.collector.is_none() && auth.collector != "unknown" {
        context.collector = Some(auth.collector.clone());
    }
    state
        .tracker
        .record_usage(&request.provider, &request.endpoint, request.quantity, context)
}

/// Report one billable call.
pub async fn report_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<UsageRequest>,
) -> (StatusCode, Json<UsageResponse>) {
    let event = record(&state, &auth, body);
    (StatusCode::ACCEPTED, Json(UsageResponse::from(&event)))
}

/// Report many billable calls.
pub async fn report_usage_batch(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<BatchUsageRequest>,
) -> Result<(StatusCode, Json<BatchUsageResponse>), ApiError> {
    if body.events.len() > MAX_BATCH_EVENTS {
        return Err(ApiError::BadRequest(format!(
            "batch holds {} events, the limit is {MAX_BATCH_EVENTS}",
            body.events.len()
        )));
    }

    let results: Vec<UsageResponse> = body
        .events
        .into_iter()
        .map(|request| UsageResponse::from(&record(&state, &auth, request)))
        .collect();

    let response = BatchUsageResponse {
        accepted: results.len(),
        unrecognized: results.iter().filter(|r| r.unrecognized).count(),
        total_cost: results
            .iter()
            .fold(0i64, |acc, r| acc.saturating_add(r.cost)),
        results,
    };

    tracing::debug!(
        collector = %auth.collector,
        accepted = response.accepted,
        unrecognized = response.unrecognized,
        "Usage batch recorded"
    );

    Ok((StatusCode::ACCEPTED, Json(response)))
}
