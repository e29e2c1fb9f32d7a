//! Aggregated report shapes returned by the governance engine.
//!
//! Collections are kept in a deterministic order so that a report over a
//! closed period serializes to the same bytes every time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::period::{Period, TimeBucket};

/// Spend on one endpoint within a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUsage {
    /// Endpoint name.
    pub endpoint: String,
    /// Summed cost.
    #[serde(rename = "totalCost", with = "crate::money::usd")]
    pub total_cost_micros: i64,
    /// Number of events.
    pub total_requests: u64,
    /// Summed quantity.
    pub total_quantity: u64,
}

/// Spend on one provider within a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    /// Provider name.
    #[serde(rename = "_id")]
    pub provider: String,
    /// Summed cost.
    #[serde(rename = "totalCost", with = "crate::money::usd")]
    pub total_cost_micros: i64,
    /// Number of events.
    pub total_requests: u64,
    /// Summed quantity.
    pub total_quantity: u64,
    /// Per-endpoint rollup, by cost descending then name.
    pub endpoints: Vec<EndpointUsage>,
}

/// Cost totals of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    /// Metered usage.
    #[serde(with = "crate::money::usd")]
    pub usage: i64,
    /// Monthly-equivalent commitment of active subscriptions.
    #[serde(with = "crate::money::usd")]
    pub subscriptions: i64,
    /// `usage + subscriptions`.
    #[serde(with = "crate::money::usd")]
    pub total: i64,
}

impl CostTotals {
    /// Build totals from the two components.
    #[must_use]
    pub const fn new(usage: i64, subscriptions: i64) -> Self {
        Self {
            usage,
            subscriptions,
            total: usage.saturating_add(subscriptions),
        }
    }
}

/// Budget position of a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    /// Monthly budget.
    #[serde(with = "crate::money::usd")]
    pub allocated: i64,
    /// Usage spend counted against the budget.
    #[serde(with = "crate::money::usd")]
    pub spent: i64,
    /// `allocated - spent`; negative when over budget.
    #[serde(with = "crate::money::usd")]
    pub remaining: i64,
    /// `spent / allocated * 100`.
    pub percentage: f64,
}

/// Rollup of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    /// The period reported.
    pub period: Period,
    /// Whether the period has ended; only closed reports are final.
    pub closed: bool,
    /// Per-provider rollup, by cost descending then name.
    pub providers: Vec<ProviderUsage>,
    /// Cost totals. The subscription share reflects plans stored at query
    /// time, even for a closed period.
    pub costs: CostTotals,
    /// Budget position, when a budget is set.
    pub budget: Option<BudgetSummary>,
}

/// One bucket of a cost series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownPoint {
    /// Bucket start (inclusive).
    pub bucket_start: DateTime<Utc>,
    /// Summed cost.
    #[serde(rename = "cost", with = "crate::money::usd")]
    pub cost_micros: i64,
    /// Number of events.
    pub requests: u64,
}

/// Time-bucketed cost series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Provider filter, if any.
    pub provider: Option<String>,
    /// Range start.
    pub start: DateTime<Utc>,
    /// Range end (exclusive).
    pub end: DateTime<Utc>,
    /// Bucket granularity.
    pub group_by: TimeBucket,
    /// One point per bucket overlapping the range, ascending; empty buckets
    /// are included with zero cost.
    pub series: Vec<BreakdownPoint>,
    /// Sum over the series.
    #[serde(rename = "total", with = "crate::money::usd")]
    pub total_micros: i64,
}
