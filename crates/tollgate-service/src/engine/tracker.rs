//! The usage tracker.
//!
//! [`UsageTracker`] is the one service object collectors and handlers talk
//! to. It is built once at startup and shared behind an `Arc`.
//!
//! # Write path
//!
//! [`UsageTracker::record_usage`] never fails. An unknown provider or
//! endpoint is recorded at zero cost and flagged `unrecognized`; a ledger
//! failure is logged and the unpersisted event is still returned.
//!
//! # Read path
//!
//! Reports, health, suggestions and exports go straight to the ledger and
//! surface `ServiceUnavailable` when it cannot answer.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use tollgate_core::{
    AlertRule, Budget, CostBreakdown, DateRange, HealthRecord, Lookup, MeterError, MonthlyUsage,
    Period, Provider, ProviderRegistry, Subscription, SubscriptionPlan, SuggestionReport,
    TimeBucket, UsageContext, UsageEvent,
};
use tollgate_store::Ledger;

use super::advisor::{AdvisorConfig, OptimizationAdvisor};
use super::aggregation;
use super::alerts::AlertDispatcher;
use super::budget::{BudgetMonitor, BudgetStatus};
use super::export::{self, ExportFilters, ExportFormat};
use super::health::HealthMonitor;

/// Governance engine facade.
pub struct UsageTracker {
    ledger: Arc<dyn Ledger>,
    registry: RwLock<Arc<ProviderRegistry>>,
    budget: BudgetMonitor,
    health: HealthMonitor,
    advisor: OptimizationAdvisor,
}

impl UsageTracker {
    /// Create a tracker over `ledger`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the stored budget cannot be read.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: ProviderRegistry,
        dispatcher: AlertDispatcher,
    ) -> Result<Self, MeterError> {
        let budget = BudgetMonitor::new(Arc::clone(&ledger), dispatcher)?;
        tracing::info!(
            providers = registry.len(),
            sinks = ?budget.dispatcher().sink_names(),
            "Usage tracker ready"
        );
        Ok(Self {
            ledger,
            registry: RwLock::new(Arc::new(registry)),
            budget,
            health: HealthMonitor::default(),
            advisor: OptimizationAdvisor::default(),
        })
    }

    /// Use a different health window.
    #[must_use]
    pub fn with_health_window(mut self, window: Duration) -> Self {
        self.health = HealthMonitor::new(window);
        self
    }

    /// Use different advisor thresholds.
    #[must_use]
    pub fn with_advisor(mut self, config: AdvisorConfig) -> Self {
        self.advisor = OptimizationAdvisor::new(config);
        self
    }

    /// The underlying ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Snapshot of the provider catalog.
    #[must_use]
    pub fn registry(&self) -> Arc<ProviderRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// The budget monitor.
    #[must_use]
    pub fn budget_monitor(&self) -> &BudgetMonitor {
        &self.budget
    }

    /// Replace one provider entry as a whole.
    ///
    /// # Errors
    ///
    /// Returns the registry's validation errors; the catalog is unchanged then.
    pub fn replace_provider(&self, provider: Provider) -> Result<(), MeterError> {
        let mut registry = self.registry.write();
        let mut next = ProviderRegistry::clone(&registry);
        let name = provider.name.clone();
        let previous = next.replace(provider)?;
        *registry = Arc::new(next);
        tracing::info!(provider = %name, replaced = previous.is_some(), "Provider catalog updated");
        Ok(())
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Price, persist and account one billable call. Never fails.
    pub fn record_usage(
        &self,
        provider: &str,
        endpoint: &str,
        quantity: u64,
        context: UsageContext,
    ) -> UsageEvent {
        let event = self.price(provider, endpoint, quantity, context);

        if let Err(e) = self.budget.ingest(&event) {
            tracing::error!(
                event_id = %event.event_id,
                provider = %event.provider,
                endpoint = %event.endpoint,
                error = %e,
                "Failed to record usage"
            );
            return event;
        }

        if !event.unrecognized {
            self.count_subscription_call(&event);
        }

        tracing::debug!(
            event_id = %event.event_id,
            provider = %event.provider,
            endpoint = %event.endpoint,
            quantity = event.quantity,
            cost_micros = event.cost_micros,
            "Usage recorded"
        );
        event
    }

    fn price(&self, provider: &str, endpoint: &str, quantity: u64, context: UsageContext) -> UsageEvent {
        let registry = self.registry();
        match registry.lookup(provider, endpoint) {
            Lookup::Found { endpoint: ep, .. } => {
                UsageEvent::priced(provider, ep.name.clone(), quantity, ep.unit_cost_micros, context)
            }
            Lookup::UnknownProvider => {
                tracing::warn!(provider = %provider, endpoint = %endpoint, "Unknown provider, recording at zero cost");
                UsageEvent::unrecognized(provider, endpoint, quantity, context)
            }
            Lookup::UnknownEndpoint => {
                tracing::warn!(provider = %provider, endpoint = %endpoint, "Unknown endpoint, recording at zero cost");
                UsageEvent::unrecognized(provider, endpoint, quantity, context)
            }
        }
    }

    fn count_subscription_call(&self, event: &UsageEvent) {
        let now = Utc::now();
        let result = self.ledger.update_subscription(&event.provider, &mut |sub| {
            if sub.is_active() {
                sub.record_call(event.quantity, now);
            }
        });
        if let Err(e) = result {
            tracing::warn!(provider = %event.provider, error = %e, "Failed to count subscription call");
        }
    }

    // =========================================================================
    // Budget and subscriptions
    // =========================================================================

    /// Validate and install a new budget.
    ///
    /// # Errors
    ///
    /// - `InvalidBudget` for a non-positive amount or malformed rules; the
    ///   previous budget stays in force.
    /// - `ServiceUnavailable` if the budget cannot be stored.
    pub fn set_budget(&self, monthly_micros: i64, alerts: Vec<AlertRule>) -> Result<Budget, MeterError> {
        let budget = Budget::new(monthly_micros, alerts)?;
        self.budget.set_budget(budget.clone(), Utc::now())?;
        Ok(budget)
    }

    /// Budget position of the current period.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn budget_status(&self) -> Result<BudgetStatus, MeterError> {
        self.budget.status(Utc::now())
    }

    /// Rebuild `period`'s threshold state from the ledger.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn recompute_thresholds(&self, period: Period) -> Result<Option<u32>, MeterError> {
        self.budget.recompute_thresholds(period)
    }

    /// Create or update the subscription for `provider`.
    ///
    /// Updating keeps this cycle's consumption counters.
    ///
    /// # Errors
    ///
    /// - `InvalidSubscription` for a malformed plan.
    /// - `ServiceUnavailable` if the ledger cannot be written.
    pub fn upsert_subscription(
        &self,
        provider: &str,
        plan: SubscriptionPlan,
    ) -> Result<Subscription, MeterError> {
        plan.validate()?;
        let now = Utc::now();

        let mut outcome = Ok(());
        let updated = self.ledger.update_subscription(provider, &mut |sub| {
            if let Err(e) = sub.apply_plan(plan.clone(), now) {
                outcome = Err(e);
            }
        })?;
        outcome?;

        let subscription = match updated {
            Some(sub) => sub,
            None => {
                let sub = Subscription::new(provider, plan, now)?;
                self.ledger.put_subscription(&sub)?;
                sub
            }
        };
        tracing::info!(
            provider = %provider,
            plan = %subscription.plan.name,
            status = ?subscription.plan.status,
            "Subscription upserted"
        );
        Ok(subscription)
    }

    /// All subscriptions, ordered by provider.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn subscriptions(&self) -> Result<Vec<Subscription>, MeterError> {
        Ok(self.ledger.list_subscriptions()?)
    }

    /// Apply renewal-date rollover to every subscription. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read or written.
    pub fn rollover_subscriptions(&self, now: DateTime<Utc>) -> Result<usize, MeterError> {
        let mut changed = 0;
        for sub in self.ledger.list_subscriptions()? {
            let mut rolled = false;
            self.ledger.update_subscription(&sub.provider, &mut |s| {
                rolled = s.rollover(now);
            })?;
            if rolled {
                changed += 1;
                tracing::info!(provider = %sub.provider, "Subscription rolled over");
            }
        }
        Ok(changed)
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Rollup of `period`, or of the current month.
    ///
    /// Subscription costs are those of the current plans; see
    /// [`aggregation::monthly_usage`].
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn monthly_usage(&self, period: Option<Period>) -> Result<MonthlyUsage, MeterError> {
        self.monthly_usage_at(period, Utc::now())
    }

    /// [`Self::monthly_usage`] as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn monthly_usage_at(
        &self,
        period: Option<Period>,
        now: DateTime<Utc>,
    ) -> Result<MonthlyUsage, MeterError> {
        let period = period.unwrap_or_else(|| Period::containing(now));
        aggregation::monthly_usage(self.ledger.as_ref(), period, self.budget.budget().as_ref(), now)
    }

    /// Time-bucketed cost series.
    ///
    /// # Errors
    ///
    /// - `InvalidDateRange` for ranges with too many buckets.
    /// - `ServiceUnavailable` if the ledger cannot be read.
    pub fn cost_breakdown(
        &self,
        provider: Option<String>,
        range: DateRange,
        group_by: TimeBucket,
    ) -> Result<CostBreakdown, MeterError> {
        aggregation::cost_breakdown(self.ledger.as_ref(), provider, range, group_by)
    }

    /// Health of every provider over the trailing window.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn api_health(&self) -> Result<Vec<HealthRecord>, MeterError> {
        self.api_health_at(Utc::now())
    }

    /// [`Self::api_health`] as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn api_health_at(&self, now: DateTime<Utc>) -> Result<Vec<HealthRecord>, MeterError> {
        self.health
            .snapshot(self.ledger.as_ref(), &self.registry(), now)
    }

    /// Ranked optimization suggestions.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn optimization_suggestions(&self) -> Result<SuggestionReport, MeterError> {
        self.optimization_suggestions_at(Utc::now())
    }

    /// [`Self::optimization_suggestions`] as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn optimization_suggestions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SuggestionReport, MeterError> {
        self.advisor
            .suggest(self.ledger.as_ref(), &self.registry(), now)
    }

    /// Export matching events in `format`.
    ///
    /// # Errors
    ///
    /// - `Serialization` if encoding fails.
    /// - `ServiceUnavailable` if the ledger cannot be read.
    pub fn export_report(
        &self,
        format: ExportFormat,
        filters: &ExportFilters,
    ) -> Result<Vec<u8>, MeterError> {
        export::export_report(self.ledger.as_ref(), format, filters)
    }

    /// Stream matching events in `format` into `writer`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::export_report`].
    pub fn export_to_writer<W: Write>(
        &self,
        format: ExportFormat,
        filters: &ExportFilters,
        writer: W,
    ) -> Result<u64, MeterError> {
        export::export_to_writer(self.ledger.as_ref(), format, filters, writer)
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("providers", &self.registry.read().len())
            .field("budget", &self.budget)
            .field("health", &self.health)
            .field("advisor", &self.advisor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tollgate_core::{
        BillingPeriod, BillingType, Endpoint, SubscriptionStatus, MICROS_PER_USD,
    };
    use tollgate_store::MemoryLedger;

    fn tracker() -> UsageTracker {
        UsageTracker::new(
            Arc::new(MemoryLedger::new()),
            ProviderRegistry::with_defaults(),
            AlertDispatcher::new(),
        )
        .unwrap()
    }

    fn plan(name: &str, cost: i64) -> SubscriptionPlan {
        SubscriptionPlan {
            name: name.into(),
            cost_micros: cost,
            billing_period: BillingPeriod::Monthly,
            status: SubscriptionStatus::Active,
            renewal_date: None,
            credits_total: 2_000,
            requests_total: 0,
        }
    }

    #[test]
    fn ghost_provider_is_recorded_at_zero_cost() {
        let tracker = tracker();
        let event = tracker.record_usage("ghost_provider", "ghost_endpoint", 5, UsageContext::default());
        assert!(event.unrecognized);
        assert_eq!(event.cost_micros, 0);
        assert_eq!(event.quantity, 5);
        assert_eq!(tracker.ledger().scan(&Default::default()).unwrap().len(), 1);
    }

    #[test]
    fn wire_paths_resolve_to_logical_names() {
        let tracker = tracker();
        let event = tracker.record_usage(
            "dataforseo",
            "/v3/keywords_data/google_ads/search_volume/live/?tag=x",
            1000,
            UsageContext::default(),
        );
        assert!(!event.unrecognized);
        assert_eq!(event.endpoint, "keywords_volume");
        assert_eq!(event.cost_micros, 750_000);
    }

    #[test]
    fn concurrent_records_sum_exactly() {
        let tracker = Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.record_usage("dataforseo", "serp_organic", 3, UsageContext::default());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let report = tracker.monthly_usage(None).unwrap();
        assert_eq!(report.costs.usage, 8 * 50 * 3 * 2_000);
        let state = tracker
            .budget_monitor()
            .period_state(Period::containing(Utc::now()))
            .unwrap();
        assert_eq!(state.spent(), report.costs.usage);
    }

    #[test]
    fn invalid_budget_keeps_the_previous_one() {
        let tracker = tracker();
        tracker.set_budget(100 * MICROS_PER_USD, vec![]).unwrap();
        assert!(matches!(
            tracker.set_budget(0, vec![]),
            Err(MeterError::InvalidBudget(_))
        ));
        assert_eq!(
            tracker.budget_monitor().budget().unwrap().monthly_micros,
            100 * MICROS_PER_USD
        );
    }

    #[test]
    fn subscription_calls_are_counted_and_upserts_keep_them() {
        let tracker = tracker();
        tracker.upsert_subscription("builtwith", plan("basic", 295 * MICROS_PER_USD)).unwrap();
        tracker.record_usage("builtwith", "domain_lookup", 3, UsageContext::default());

        let updated = tracker
            .upsert_subscription("builtwith", plan("pro", 495 * MICROS_PER_USD))
            .unwrap();
        assert_eq!(updated.plan.name, "pro");
        assert_eq!(updated.usage.requests.used, 1);
        assert_eq!(updated.usage.credits.used, 3);

        let report = tracker.monthly_usage(None).unwrap();
        assert_eq!(report.costs.subscriptions, 495 * MICROS_PER_USD);
    }

    #[test]
    fn replaced_provider_prices_new_events() {
        let tracker = tracker();
        tracker
            .replace_provider(
                Provider::new("acme", BillingType::PayPerUse).with_endpoint(Endpoint::new("search", 10)),
            )
            .unwrap();
        let event = tracker.record_usage("acme", "search", 2, UsageContext::default());
        assert_eq!(event.cost_micros, 20);
    }
}
