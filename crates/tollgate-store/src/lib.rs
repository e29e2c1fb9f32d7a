//! Usage ledger storage for tollgate.
//!
//! The [`Ledger`] trait is the single source of truth for everything the
//! governance engine derives: usage events, subscriptions, the budget and the
//! set of budget thresholds already fired.
//!
//! # Backends
//!
//! - [`MemoryLedger`]: process-local, used by tests and single-shot tools
//! - `RocksLedger` (feature `rocksdb-backend`): persistent, column families:
//!   - `usage_events`: events keyed by `timestamp_micros || event_id`
//!   - `subscriptions`: keyed by provider name
//!   - `meta`: the budget
//!   - `budget_alerts`: fired alerts keyed by `period || threshold`
//!
//! # Example
//!
//! ```
//! use tollgate_core::{UsageContext, UsageEvent};
//! use tollgate_store::{GroupKey, Ledger, LedgerFilter, MemoryLedger};
//!
//! let ledger = MemoryLedger::new();
//! let event = UsageEvent::priced("dataforseo", "keywords_volume", 1000, 750, UsageContext::default());
//! ledger.append(&event).unwrap();
//!
//! let sums = ledger
//!     .sum_by(&[GroupKey::Provider], &LedgerFilter::default(), None)
//!     .unwrap();
//! assert_eq!(sums[0].cost_micros, 750_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use tollgate_core::{Budget, BudgetAlert, DateRange, Period, Subscription, TimeBucket, UsageEvent};

pub use error::{Result, StoreError};
pub use memory::MemoryLedger;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksLedger;

/// Which events a query covers. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    /// Only this provider.
    pub provider: Option<String>,
    /// Only this endpoint.
    pub endpoint: Option<String>,
    /// Only events with `timestamp` in `[start, end)`.
    pub range: Option<DateRange>,
}

impl LedgerFilter {
    /// Events of one period.
    #[must_use]
    pub fn period(period: Period) -> Self {
        Self {
            range: Some(period.range()),
            ..Self::default()
        }
    }

    /// Events in a range.
    #[must_use]
    pub fn range(range: DateRange) -> Self {
        Self {
            range: Some(range),
            ..Self::default()
        }
    }

    /// Narrow to one provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Whether `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &UsageEvent) -> bool {
        self.provider.as_deref().map_or(true, |p| p == event.provider)
            && self.endpoint.as_deref().map_or(true, |e| e == event.endpoint)
            && self.range.map_or(true, |r| r.contains(event.timestamp))
    }
}

/// Dimension to group a sum by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Provider name.
    Provider,
    /// Endpoint name.
    Endpoint,
    /// Request signature; events without one group under `None`.
    Path,
}

/// Values of the requested group keys; keys not requested stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupValues {
    /// Provider, when grouped by provider.
    pub provider: Option<String>,
    /// Endpoint, when grouped by endpoint.
    pub endpoint: Option<String>,
    /// Path, when grouped by path.
    pub path: Option<String>,
    /// Bucket start, when a time bucket was requested.
    pub bucket_start: Option<DateTime<Utc>>,
}

impl GroupValues {
    /// Project an event onto the requested keys.
    #[must_use]
    pub fn of(event: &UsageEvent, keys: &[GroupKey], bucket: Option<TimeBucket>) -> Self {
        let mut values = Self {
            bucket_start: bucket.map(|b| b.bucket_start(event.timestamp)),
            ..Self::default()
        };
        for key in keys {
            match key {
                GroupKey::Provider => values.provider = Some(event.provider.clone()),
                GroupKey::Endpoint => values.endpoint = Some(event.endpoint.clone()),
                GroupKey::Path => values.path.clone_from(&event.path),
            }
        }
        values
    }
}

/// One row of a grouped sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedSum {
    /// Group values.
    pub key: GroupValues,
    /// Summed cost in micros.
    pub cost_micros: i64,
    /// Summed quantity.
    pub quantity: u64,
    /// Number of events.
    pub count: u64,
    /// Number of successful events.
    pub successes: u64,
    /// Summed response time over events that report one.
    pub response_time_total_ms: u64,
    /// Number of events that report a response time.
    pub timed: u64,
}

impl GroupedSum {
    /// Fold one event into the row.
    pub fn add(&mut self, event: &UsageEvent) {
        self.cost_micros = self.cost_micros.saturating_add(event.cost_micros);
        self.quantity = self.quantity.saturating_add(event.quantity);
        self.count += 1;
        if event.success {
            self.successes += 1;
        }
        if let Some(ms) = event.response_time_ms {
            self.response_time_total_ms = self.response_time_total_ms.saturating_add(ms);
            self.timed += 1;
        }
    }

    /// `successes / count`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| self.successes as f64 / self.count as f64)
    }

    /// Mean response time over timed events.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_response_ms(&self) -> Option<f64> {
        (self.timed > 0).then(|| self.response_time_total_ms as f64 / self.timed as f64)
    }
}

/// The storage trait behind the governance engine.
///
/// Events are append-only. Reads return events ordered by
/// `(timestamp, event_id)`, so every query over a closed range is repeatable.
pub trait Ledger: Send + Sync {
    // =========================================================================
    // Usage events
    // =========================================================================

    /// Append one immutable event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the event.
    fn append(&self, event: &UsageEvent) -> Result<()>;

    /// Visit matching events in `(timestamp, event_id)` order.
    ///
    /// Stops at the first error returned by `visit`.
    ///
    /// # Errors
    ///
    /// Returns backend errors or the first error from `visit`.
    fn for_each(
        &self,
        filter: &LedgerFilter,
        visit: &mut dyn FnMut(&UsageEvent) -> Result<()>,
    ) -> Result<()>;

    /// Collect matching events.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn scan(&self, filter: &LedgerFilter) -> Result<Vec<UsageEvent>> {
        let mut events = Vec::new();
        self.for_each(filter, &mut |event| {
            events.push(event.clone());
            Ok(())
        })?;
        Ok(events)
    }

    /// Grouped sums over matching events, ordered by group values.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn sum_by(
        &self,
        group_keys: &[GroupKey],
        filter: &LedgerFilter,
        bucket: Option<TimeBucket>,
    ) -> Result<Vec<GroupedSum>> {
        let mut groups: BTreeMap<GroupValues, GroupedSum> = BTreeMap::new();
        self.for_each(filter, &mut |event| {
            let key = GroupValues::of(event, group_keys, bucket);
            groups
                .entry(key.clone())
                .or_insert_with(|| GroupedSum {
                    key,
                    ..GroupedSum::default()
                })
                .add(event);
            Ok(())
        })?;
        Ok(groups.into_values().collect())
    }

    /// Total cost of matching events in micros.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn total(&self, filter: &LedgerFilter) -> Result<i64> {
        let mut total = 0i64;
        self.for_each(filter, &mut |event| {
            total = total.saturating_add(event.cost_micros);
            Ok(())
        })?;
        Ok(total)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Insert or replace the subscription for its provider.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Get the subscription for a provider.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn get_subscription(&self, provider: &str) -> Result<Option<Subscription>>;

    /// All subscriptions ordered by provider.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Atomically read-modify-write one subscription.
    ///
    /// Returns the updated subscription, or `None` if the provider has none.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn update_subscription(
        &self,
        provider: &str,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>>;

    // =========================================================================
    // Budget and threshold claims
    // =========================================================================

    /// Replace the budget.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn put_budget(&self, budget: &Budget) -> Result<()>;

    /// The current budget, if one was set.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn get_budget(&self) -> Result<Option<Budget>>;

    /// Record `alert` unless its `(period, threshold)` was already claimed.
    ///
    /// Returns `true` for the caller that won the claim. This is what keeps a
    /// threshold from firing twice in one period across restarts.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn claim_threshold(&self, alert: &BudgetAlert) -> Result<bool>;

    /// Alerts fired in a period, ascending by threshold.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    fn list_alerts(&self, period: Period) -> Result<Vec<BudgetAlert>>;
}
