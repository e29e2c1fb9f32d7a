//! Provider billing metadata.
//!
//! A [`Provider`] describes how one paid external API charges: per call,
//! per subscription, or both. Providers are built once when the registry is
//! initialised and replaced wholesale on reconfiguration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// How a provider bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    /// Flat recurring fee, calls are not metered individually.
    Subscription,
    /// Every call is charged per unit.
    PayPerUse,
    /// Recurring fee plus per-unit charges.
    Hybrid,
}

/// Billing period of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Billed every calendar month.
    Monthly,
    /// Billed once a year.
    Yearly,
}

impl BillingPeriod {
    /// Number of months covered by one billing cycle.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    /// Normalise a per-cycle cost to its monthly equivalent (`yearly / 12`).
    #[must_use]
    pub const fn monthly_equivalent(self, cost_micros: i64) -> i64 {
        match self {
            Self::Monthly => cost_micros,
            Self::Yearly => cost_micros / 12,
        }
    }
}

/// A billable operation exposed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical name, unique within the provider (e.g. `keywords_volume`).
    pub name: String,

    /// Wire path collectors may report instead of the logical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Cost per unit in micros.
    #[serde(rename = "unit_cost", with = "crate::money::usd")]
    pub unit_cost_micros: i64,

    /// What one unit is (call, keyword, domain, credit).
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Free-form grouping used in reports.
    #[serde(default)]
    pub category: String,
}

fn default_unit() -> String {
    "request".to_string()
}

impl Endpoint {
    /// Create an endpoint priced in micros per unit.
    #[must_use]
    pub fn new(name: impl Into<String>, unit_cost_micros: i64) -> Self {
        Self {
            name: name.into(),
            path: None,
            unit_cost_micros,
            unit: default_unit(),
            category: String::new(),
        }
    }

    /// Set the wire path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the unit name.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Subscription terms advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTerms {
    /// Cost per billing cycle in micros.
    #[serde(rename = "cost", with = "crate::money::usd")]
    pub cost_micros: i64,

    /// Billing cycle.
    pub period: BillingPeriod,

    /// Credits included per cycle.
    #[serde(default)]
    pub credits: u64,

    /// Next renewal, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<DateTime<Utc>>,
}

/// Provider-side request quotas. Advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Requests allowed per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,

    /// Requests allowed per day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u32>,
}

/// A paid external data source and its pricing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Unique provider name.
    pub name: String,

    /// Pricing model.
    pub billing_type: BillingType,

    /// Billable endpoints in declaration order.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Subscription terms for subscription and hybrid providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionTerms>,

    /// Quotas used for headroom reporting.
    #[serde(default)]
    pub rate_limits: RateLimits,
}

impl Provider {
    /// Create a provider with no endpoints.
    #[must_use]
    pub fn new(name: impl Into<String>, billing_type: BillingType) -> Self {
        Self {
            name: name.into(),
            billing_type,
            endpoints: Vec::new(),
            subscription: None,
            rate_limits: RateLimits::default(),
        }
    }

    /// Append an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Set subscription terms.
    #[must_use]
    pub fn with_subscription(mut self, terms: SubscriptionTerms) -> Self {
        self.subscription = Some(terms);
        self
    }

    /// Set the per-minute quota.
    #[must_use]
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.rate_limits.requests_per_minute = Some(rpm);
        self
    }

    /// Check endpoint names are unique and costs are non-negative.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEndpoint` or `InvalidEndpoint`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(MeterError::InvalidEndpoint {
                    provider: self.name.clone(),
                    endpoint: endpoint.name.clone(),
                    reason: "empty name".into(),
                });
            }
            if endpoint.unit_cost_micros < 0 {
                return Err(MeterError::InvalidEndpoint {
                    provider: self.name.clone(),
                    endpoint: endpoint.name.clone(),
                    reason: "negative unit cost".into(),
                });
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(MeterError::DuplicateEndpoint {
                    provider: self.name.clone(),
                    endpoint: endpoint.name.clone(),
                });
            }
        }
        Ok(())
    }
}
