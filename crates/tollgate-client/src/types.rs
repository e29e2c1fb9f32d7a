//! Request and response types for the tollgate client.
//!
//! Reports and rollups reuse the [`tollgate_core`] types; the shapes defined
//! here exist only on the wire.

use serde::{Deserialize, Serialize};

use tollgate_core::money::{usd, usd_opt};
use tollgate_core::{AlertRule, Budget, BudgetAlert, EventId, Period, UsageContext};

/// One billable call to report.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// Provider name.
    pub provider: String,
    /// Endpoint name or wire path.
    pub endpoint: String,
    /// Units consumed.
    pub quantity: u64,
    /// Optional call details.
    #[serde(flatten)]
    pub context: UsageContext,
}

impl UsageReport {
    /// A single-unit report with no context.
    #[must_use]
    pub fn new(provider: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            quantity: 1,
            context: UsageContext::default(),
        }
    }

    /// Set the quantity.
    #[must_use]
    pub fn quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Attach call details.
    #[must_use]
    pub fn context(mut self, context: UsageContext) -> Self {
        self.context = context;
        self
    }
}

/// Acknowledgement of one report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UsageReceipt {
    /// Ledger event id.
    pub event_id: EventId,
    /// Provider name.
    pub provider: String,
    /// Resolved endpoint name.
    pub endpoint: String,
    /// Units recorded.
    pub quantity: u64,
    /// Computed cost in micros.
    #[serde(rename = "cost", with = "usd")]
    pub cost_micros: i64,
    /// Whether the provider or endpoint was unknown to tollgate.
    pub unrecognized: bool,
}

/// Batch request body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchUsageRequest<'a> {
    pub events: &'a [UsageReport],
}

/// Acknowledgement of a batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchReceipt {
    /// Reports recorded.
    pub accepted: usize,
    /// Reports for unknown providers or endpoints.
    pub unrecognized: usize,
    /// Summed cost in micros.
    #[serde(rename = "total_cost", with = "usd")]
    pub total_cost_micros: i64,
    /// Per-report receipts, in request order.
    pub results: Vec<UsageReceipt>,
}

/// Budget position of the current period.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BudgetStatus {
    /// Current period.
    pub period: Period,
    /// Budget in force.
    pub budget: Option<Budget>,
    /// Monthly amount in micros.
    #[serde(with = "usd_opt")]
    pub allocated: Option<i64>,
    /// Usage spend in micros.
    #[serde(with = "usd")]
    pub spent: i64,
    /// Remaining amount in micros.
    #[serde(with = "usd_opt")]
    pub remaining: Option<i64>,
    /// `spent / allocated * 100`.
    pub percent_used: Option<f64>,
    /// Highest threshold crossed.
    pub last_threshold_crossed: Option<u32>,
    /// Whether spend exceeds the budget.
    pub over_budget: bool,
    /// Alerts fired this period.
    pub alerts: Vec<BudgetAlert>,
}

/// Budget update body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SetBudgetRequest {
    pub monthly: f64,
    pub alerts: Vec<AlertRule>,
}

/// API error response shape.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
