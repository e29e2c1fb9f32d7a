//! Application state.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::engine::UsageTracker;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The governance engine.
    pub tracker: Arc<UsageTracker>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(tracker: Arc<UsageTracker>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - usage reports will be rejected");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - budget and subscription writes are disabled");
        }

        Self { tracker, config }
    }
}
