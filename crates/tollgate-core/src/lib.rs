//! Core types and rules for tollgate.
//!
//! This crate holds the storage- and transport-agnostic parts of the usage
//! governance engine:
//!
//! - **Providers**: `Provider`, `Endpoint`, `ProviderRegistry`
//! - **Usage**: `UsageEvent`, `UsageContext`
//! - **Subscriptions**: `Subscription`, `SubscriptionPlan`, rollover
//! - **Budgets**: `Budget`, `AlertRule`, `BudgetAlert`, threshold math
//! - **Reports**: monthly rollups, cost breakdowns, health records, suggestions
//! - **Time**: `Period`, `DateRange`, `TimeBucket`
//!
//! # Money
//!
//! **1 USD = 1 000 000 micros**
//!
//! - `keywords_volume` costs $0.00075 per keyword → 750 micros
//! - 1000 keywords → 750 000 micros → rendered as `0.75`
//! - Stored as `i64` so totals never depend on summation order

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod advisor;
pub mod budget;
pub mod error;
pub mod health;
pub mod ids;
pub mod money;
pub mod period;
pub mod provider;
pub mod registry;
pub mod report;
pub mod subscription;
pub mod usage;

pub use advisor::{Priority, Suggestion, SuggestionKind, SuggestionReport};
pub use budget::{AlertAction, AlertRule, Budget, BudgetAlert, DEFAULT_THRESHOLDS};
pub use error::{MeterError, Result};
pub use health::{HealthRecord, HealthStats, HealthStatus, RateLimitHeadroom};
pub use ids::{AlertId, EventId, IdError};
pub use money::{micros_to_usd, usd_to_micros, MICROS_PER_USD};
pub use period::{DateRange, Period, TimeBucket};
pub use provider::{BillingPeriod, BillingType, Endpoint, Provider, RateLimits, SubscriptionTerms};
pub use registry::{Lookup, ProviderRegistry};
pub use report::{
    BreakdownPoint, BudgetSummary, CostBreakdown, CostTotals, EndpointUsage, MonthlyUsage,
    ProviderUsage,
};
pub use subscription::{
    Subscription, SubscriptionPlan, SubscriptionStatus, SubscriptionUsage, UsageCounter,
};
pub use usage::{UsageContext, UsageEvent};
