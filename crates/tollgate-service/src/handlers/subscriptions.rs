//! Subscription handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use tollgate_core::{Subscription, SubscriptionPlan};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Create or update the subscription of one provider.
pub async fn upsert_subscription(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(provider): Path<String>,
    Json(plan): Json<SubscriptionPlan>,
) -> Result<Json<Subscription>, ApiError> {
    if state.tracker.registry().get(&provider).is_none() {
        tracing::warn!(provider = %provider, "Subscription for a provider missing from the catalog");
    }

    let subscription = state.tracker.upsert_subscription(&provider, plan)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        provider = %provider,
        plan = %subscription.plan.name,
        status = ?subscription.plan.status,
        "Subscription upserted"
    );

    Ok(Json(subscription))
}

/// All subscriptions.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.tracker.subscriptions()?))
}
