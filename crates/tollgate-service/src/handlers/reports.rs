//! Read-only report handlers: rollups, breakdowns, exports, health and
//! optimization suggestions.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

use tollgate_core::{
    CostBreakdown, DateRange, HealthRecord, MonthlyUsage, Period, SuggestionReport, TimeBucket,
};

use crate::engine::{ExportFilters, ExportFormat};
use crate::error::ApiError;
use crate::state::AppState;

/// Default breakdown window when no start is given.
const DEFAULT_BREAKDOWN_DAYS: i64 = 30;

/// Monthly usage query parameters.
#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    /// `YYYY-MM`; the current month when absent.
    pub period: Option<String>,
}

/// Rollup of one calendar month.
pub async fn monthly_usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthlyQuery>,
) -> Result<Json<MonthlyUsage>, ApiError> {
    let period = query
        .period
        .as_deref()
        .map(str::parse::<Period>)
        .transpose()?;
    Ok(Json(state.tracker.monthly_usage(period)?))
}

/// Cost breakdown query parameters.
#[derive(Debug, Deserialize)]
pub struct BreakdownQuery {
    /// Only this provider.
    pub provider: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`; 30 days before `end` when absent.
    pub start: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (exclusive); now when absent.
    pub end: Option<String>,
    /// `day`, `week` or `month` (default `day`).
    pub group_by: Option<String>,
}

/// Time-bucketed cost series.
pub async fn cost_breakdown(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BreakdownQuery>,
) -> Result<Json<CostBreakdown>, ApiError> {
    let group_by = query
        .group_by
        .as_deref()
        .map_or(Ok(TimeBucket::Day), str::parse)?;
    let end = query
        .end
        .as_deref()
        .map(parse_instant)
        .transpose()?
        .unwrap_or_else(Utc::now);
    let start = query
        .start
        .as_deref()
        .map(parse_instant)
        .transpose()?
        .unwrap_or(end - Duration::days(DEFAULT_BREAKDOWN_DAYS));
    let range = DateRange::new(start, end)?;

    Ok(Json(
        state
            .tracker
            .cost_breakdown(query.provider, range, group_by)?,
    ))
}

/// Export query parameters.
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `json` (default) or `csv`.
    pub format: Option<String>,
    /// Only this provider.
    pub provider: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
}

/// Download matching ledger events.
pub async fn export_usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    // Rejected before any ledger access.
    let format: ExportFormat = query.format.as_deref().unwrap_or("json").parse()?;

    let start = query.start.as_deref().map(parse_instant).transpose()?;
    let end = query.end.as_deref().map(parse_instant).transpose()?;
    let range = match (start, end) {
        (None, None) => None,
        (start, end) => Some(DateRange::new(
            start.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )?),
    };
    let filters = ExportFilters {
        provider: query.provider,
        range,
    };

    let body = state.tracker.export_report(format, &filters)?;
    let disposition = format!(
        "attachment; filename=\"tollgate-usage.{}\"",
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Health of every provider over the trailing window.
pub async fn provider_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HealthRecord>>, ApiError> {
    Ok(Json(state.tracker.api_health()?))
}

/// Ranked optimization suggestions.
pub async fn optimization_suggestions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuggestionReport>, ApiError> {
    Ok(Json(state.tracker.optimization_suggestions()?))
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (UTC midnight).
fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| ApiError::BadRequest(format!("invalid timestamp: {raw}")))
}
