//! Usage event types for tollgate.
//!
//! Collectors report every billable third-party call. Each report becomes one
//! immutable [`UsageEvent`] in the ledger, priced at ingestion time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// Optional details a collector attaches to a usage report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageContext {
    /// HTTP status returned by the provider (default 200).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Explicit success flag; derived from `status_code` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Provider response time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// Request signature (path plus query) used for duplicate detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Caller correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Business profile the call was made for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,

    /// Name of the reporting collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,

    /// When the call happened, for delayed or backfilled reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,

    /// Additional context.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl UsageContext {
    /// Set the provider status code.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Set the response time.
    #[must_use]
    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    /// Set the request signature.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Backdate the event.
    #[must_use]
    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    /// Effective status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status_code.unwrap_or(200)
    }

    /// Effective success flag: explicit flag, else 2xx/3xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or_else(|| (200..400).contains(&self.status()))
    }
}

/// An immutable, priced record of one billable call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique, time-ordered id.
    pub event_id: EventId,

    /// When the call happened.
    pub timestamp: DateTime<Utc>,

    /// Provider name as reported.
    pub provider: String,

    /// Resolved logical endpoint name, or the raw reference when unrecognized.
    pub endpoint: String,

    /// Units consumed (at least 1).
    pub quantity: u64,

    /// Unit cost applied, in micros.
    pub unit_cost_micros: i64,

    /// `unit_cost_micros × quantity`.
    pub cost_micros: i64,

    /// Provider status code.
    pub status_code: u16,

    /// Whether the call succeeded.
    pub success: bool,

    /// Provider response time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// Request signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Caller correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Business profile id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,

    /// Reporting collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,

    /// Additional context.
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Set when the provider or endpoint was not in the registry; cost is 0.
    pub unrecognized: bool,
}

impl UsageEvent {
    /// Build a priced event. Quantity is clamped to at least 1.
    #[must_use]
    pub fn priced(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        quantity: u64,
        unit_cost_micros: i64,
        context: UsageContext,
    ) -> Self {
        let quantity = quantity.max(1);
        let cost_micros = unit_cost_micros.saturating_mul(i64::try_from(quantity).unwrap_or(i64::MAX));
        Self::build(
            provider.into(),
            endpoint.into(),
            quantity,
            unit_cost_micros,
            cost_micros,
            false,
            context,
        )
    }

    /// Build a zero-cost event for a provider/endpoint missing from the registry.
    #[must_use]
    pub fn unrecognized(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        quantity: u64,
        context: UsageContext,
    ) -> Self {
        Self::build(
            provider.into(),
            endpoint.into(),
            quantity.max(1),
            0,
            0,
            true,
            context,
        )
    }

    fn build(
        provider: String,
        endpoint: String,
        quantity: u64,
        unit_cost_micros: i64,
        cost_micros: i64,
        unrecognized: bool,
        context: UsageContext,
    ) -> Self {
        let status_code = context.status();
        let success = context.is_success();
        Self {
            event_id: EventId::generate(),
            timestamp: context.occurred_at.unwrap_or_else(Utc::now),
            provider,
            endpoint,
            quantity,
            unit_cost_micros,
            cost_micros,
            status_code,
            success,
            response_time_ms: context.response_time_ms,
            path: context.path,
            request_id: context.request_id,
            profile_id: context.profile_id,
            collector: context.collector,
            metadata: context.metadata,
            unrecognized,
        }
    }
}
