//! Budget monitor.
//!
//! Spend is tracked per calendar month in a lazily created [`PeriodState`]:
//! per-provider running totals seeded from the ledger the first time the
//! period is touched, then bumped on every append.
//!
//! # Exactly once
//!
//! The in-process `fired` set is only a cache. A threshold fires when the
//! ledger's `claim_threshold` says this caller won the `(period, threshold)`
//! slot, so a restart or a second instance cannot fire it again.
//!
//! # Recompute
//!
//! Appends hold the period's gate for reading, so
//! [`BudgetMonitor::recompute_thresholds`] can take it for writing and rebuild
//! the totals from the ledger without racing an append that has not yet been
//! counted.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use tollgate_core::{Budget, BudgetAlert, MeterError, Period, UsageEvent};
use tollgate_store::{GroupKey, Ledger, LedgerFilter};

use super::alerts::AlertDispatcher;

#[derive(Debug, Default)]
struct ThresholdState {
    fired: BTreeSet<u32>,
    hydrated: bool,
}

/// Running spend of one period.
#[derive(Debug, Default)]
pub struct PeriodState {
    totals: DashMap<String, i64>,
    thresholds: Mutex<ThresholdState>,
    gate: RwLock<()>,
}

impl PeriodState {
    fn seeded(ledger: &dyn Ledger, period: Period) -> Result<Self, MeterError> {
        let state = Self::default();
        state.reload(ledger, period)?;
        Ok(state)
    }

    fn reload(&self, ledger: &dyn Ledger, period: Period) -> Result<(), MeterError> {
        let sums = ledger.sum_by(&[GroupKey::Provider], &LedgerFilter::period(period), None)?;
        self.totals.clear();
        for row in sums {
            if let Some(provider) = row.key.provider {
                self.totals.insert(provider, row.cost_micros);
            }
        }
        Ok(())
    }

    fn add(&self, provider: &str, cost_micros: i64) {
        if cost_micros == 0 {
            return;
        }
        let mut total = self.totals.entry(provider.to_string()).or_insert(0);
        *total = total.saturating_add(cost_micros);
    }

    /// Usage spend of the period.
    #[must_use]
    pub fn spent(&self) -> i64 {
        self.totals
            .iter()
            .fold(0i64, |acc, entry| acc.saturating_add(*entry.value()))
    }

    /// Spend of one provider.
    #[must_use]
    pub fn provider_spent(&self, provider: &str) -> i64 {
        self.totals.get(provider).map_or(0, |v| *v)
    }
}

/// Budget position reported by `GET /v1/budget`.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    /// Period reported.
    pub period: Period,
    /// Budget in force, if any.
    pub budget: Option<Budget>,
    /// Monthly allocation.
    #[serde(with = "tollgate_core::money::usd_opt")]
    pub allocated: Option<i64>,
    /// Usage spend of the period.
    #[serde(with = "tollgate_core::money::usd")]
    pub spent: i64,
    /// `allocated - spent`.
    #[serde(with = "tollgate_core::money::usd_opt")]
    pub remaining: Option<i64>,
    /// `spent / allocated * 100`.
    pub percent_used: Option<f64>,
    /// Highest threshold crossed at the current spend.
    pub last_threshold_crossed: Option<u32>,
    /// Whether spend exceeds the allocation.
    pub over_budget: bool,
    /// Alerts fired this period, ascending by threshold.
    pub alerts: Vec<BudgetAlert>,
}

/// Tracks spend against the budget and fires each threshold once per period.
pub struct BudgetMonitor {
    ledger: Arc<dyn Ledger>,
    budget: RwLock<Option<Budget>>,
    periods: DashMap<Period, Arc<PeriodState>>,
    dispatcher: AlertDispatcher,
}

impl BudgetMonitor {
    /// Create a monitor, loading the stored budget.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the budget cannot be read.
    pub fn new(ledger: Arc<dyn Ledger>, dispatcher: AlertDispatcher) -> Result<Self, MeterError> {
        let budget = ledger.get_budget()?;
        if let Some(b) = &budget {
            tracing::info!(
                monthly_usd = tollgate_core::micros_to_usd(b.monthly_micros),
                thresholds = b.alerts.len(),
                "Loaded budget"
            );
        }
        Ok(Self {
            ledger,
            budget: RwLock::new(budget),
            periods: DashMap::new(),
            dispatcher,
        })
    }

    /// The budget in force.
    #[must_use]
    pub fn budget(&self) -> Option<Budget> {
        self.budget.read().clone()
    }

    /// The alert dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Persist a new budget and evaluate the current period against it.
    ///
    /// Thresholds already fired this period stay fired.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the budget cannot be stored; the
    /// previous budget then stays in force.
    pub fn set_budget(&self, budget: Budget, now: DateTime<Utc>) -> Result<(), MeterError> {
        self.ledger.put_budget(&budget)?;
        tracing::info!(
            monthly_usd = tollgate_core::micros_to_usd(budget.monthly_micros),
            thresholds = ?budget.alerts.iter().map(|r| r.threshold_percent).collect::<Vec<_>>(),
            "Budget updated"
        );
        *self.budget.write() = Some(budget);

        let period = Period::containing(now);
        match self.period_state(period) {
            Ok(state) => self.evaluate(period, &state),
            Err(e) => tracing::warn!(period = %period, error = %e, "Deferred threshold check"),
        }
        Ok(())
    }

    /// State of `period`, seeding it from the ledger on first use.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if seeding fails.
    pub fn period_state(&self, period: Period) -> Result<Arc<PeriodState>, MeterError> {
        if let Some(state) = self.periods.get(&period) {
            return Ok(Arc::clone(&state));
        }
        let seeded = PeriodState::seeded(self.ledger.as_ref(), period)?;
        tracing::debug!(period = %period, spent = seeded.spent(), "Seeded period totals");
        Ok(Arc::clone(
            &self.periods.entry(period).or_insert_with(|| Arc::new(seeded)),
        ))
    }

    /// Append `event` to the ledger, count it and fire any newly crossed thresholds.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the append fails; nothing is counted then.
    pub fn ingest(&self, event: &UsageEvent) -> Result<(), MeterError> {
        let period = Period::containing(event.timestamp);
        let state = match self.period_state(period) {
            Ok(state) => state,
            Err(e) => {
                // Counted by the next successful seed, which reads it back.
                tracing::warn!(period = %period, error = %e, "Period totals unavailable");
                self.ledger.append(event)?;
                return Ok(());
            }
        };

        {
            let _gate = state.gate.read();
            self.ledger.append(event)?;
            state.add(&event.provider, event.cost_micros);
        }

        let state = self.settle(period, state);
        self.evaluate(period, &state);
        Ok(())
    }

    /// The live state of `period` after an append counted into `state`.
    ///
    /// If `state` was evicted meanwhile and a replacement seeded before the
    /// append landed, the replacement is missing the event; it is reloaded
    /// from the ledger.
    fn settle(&self, period: Period, state: Arc<PeriodState>) -> Arc<PeriodState> {
        let current = match self.periods.get(&period) {
            Some(current) if !Arc::ptr_eq(&current, &state) => Arc::clone(&current),
            _ => return state,
        };
        let reloaded = {
            let _gate = current.gate.write();
            current.reload(self.ledger.as_ref(), period)
        };
        if let Err(e) = reloaded {
            tracing::warn!(period = %period, error = %e, "Reload after eviction failed");
        }
        current
    }

    /// Fire every crossed, not yet claimed threshold of `period` in ascending order.
    fn evaluate(&self, period: Period, state: &PeriodState) {
        let Some(budget) = self.budget() else {
            return;
        };
        let spent = state.spent();
        if budget.highest_crossed(spent).is_none() {
            return;
        }

        let mut thresholds = state.thresholds.lock();
        if !thresholds.hydrated {
            match self.ledger.list_alerts(period) {
                Ok(alerts) => {
                    thresholds
                        .fired
                        .extend(alerts.iter().map(|a| a.threshold_percent));
                    thresholds.hydrated = true;
                }
                Err(e) => {
                    tracing::warn!(period = %period, error = %e, "Cannot load fired alerts");
                    return;
                }
            }
        }

        for rule in budget.crossed(spent) {
            if thresholds.fired.contains(&rule.threshold_percent) {
                continue;
            }
            let alert = BudgetAlert::new(period, &budget, rule, spent);
            match self.ledger.claim_threshold(&alert) {
                Ok(true) => {
                    thresholds.fired.insert(rule.threshold_percent);
                    self.dispatcher.dispatch(&alert);
                }
                Ok(false) => {
                    tracing::debug!(
                        period = %period,
                        threshold = rule.threshold_percent,
                        "Threshold already claimed"
                    );
                    thresholds.fired.insert(rule.threshold_percent);
                }
                Err(e) => {
                    tracing::warn!(
                        period = %period,
                        threshold = rule.threshold_percent,
                        error = %e,
                        "Threshold claim failed"
                    );
                    break;
                }
            }
        }
    }

    /// Rebuild `period`'s totals and budget from the ledger and fire anything
    /// the rebuilt spend crosses.
    ///
    /// Returns the highest threshold crossed at the rebuilt spend.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn recompute_thresholds(&self, period: Period) -> Result<Option<u32>, MeterError> {
        let budget = self.ledger.get_budget()?;
        *self.budget.write() = budget.clone();

        let state = self.period_state(period)?;
        {
            let _gate = state.gate.write();
            state.reload(self.ledger.as_ref(), period)?;
            state.thresholds.lock().hydrated = false;
        }
        self.evaluate(period, &state);

        let spent = state.spent();
        let highest = budget.as_ref().and_then(|b| b.highest_crossed(spent));
        tracing::debug!(period = %period, spent, highest = ?highest, "Recomputed thresholds");
        Ok(highest)
    }

    /// Budget position of the period containing `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn status(&self, now: DateTime<Utc>) -> Result<BudgetStatus, MeterError> {
        let period = Period::containing(now);
        let state = self.period_state(period)?;
        let alerts = self.ledger.list_alerts(period)?;
        let budget = self.budget();
        let spent = state.spent();

        Ok(BudgetStatus {
            period,
            allocated: budget.as_ref().map(|b| b.monthly_micros),
            spent,
            remaining: budget.as_ref().map(|b| b.monthly_micros - spent),
            percent_used: budget.as_ref().map(|b| b.percent_used(spent)),
            last_threshold_crossed: budget.as_ref().and_then(|b| b.highest_crossed(spent)),
            over_budget: budget.as_ref().is_some_and(|b| spent > b.monthly_micros),
            budget,
            alerts,
        })
    }

    /// Drop cached state of periods before `period`.
    ///
    /// A late event for an evicted period seeds a fresh state from the
    /// ledger. An ingest already holding the evicted state reconciles
    /// through `settle`.
    pub fn evict_before(&self, period: Period) {
        self.periods.retain(|p, _| *p >= period);
    }
}

impl std::fmt::Debug for BudgetMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetMonitor")
            .field("budget", &*self.budget.read())
            .field("periods", &self.periods.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
