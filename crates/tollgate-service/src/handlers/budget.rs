//! Budget handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use tollgate_core::{usd_to_micros, AlertRule};

use crate::auth::AdminAuth;
use crate::engine::BudgetStatus;
use crate::error::ApiError;
use crate::state::AppState;

/// Budget update request.
#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    /// Monthly amount in USD.
    pub monthly: f64,
    /// Alert ladder; the default 50/75/90/100 ladder when empty.
    #[serde(default)]
    pub alerts: Vec<AlertRule>,
}

/// Budget position of the current period.
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BudgetStatus>, ApiError> {
    Ok(Json(state.tracker.budget_status()?))
}

/// Replace the monthly budget.
pub async fn set_budget(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<SetBudgetRequest>,
) -> Result<Json<BudgetStatus>, ApiError> {
    if !body.monthly.is_finite() {
        return Err(ApiError::BadRequest("monthly must be a finite amount".into()));
    }

    let budget = state
        .tracker
        .set_budget(usd_to_micros(body.monthly), body.alerts)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        monthly_usd = body.monthly,
        thresholds = ?budget.alerts.iter().map(|r| r.threshold_percent).collect::<Vec<_>>(),
        "Budget updated"
    );

    Ok(Json(state.tracker.budget_status()?))
}
