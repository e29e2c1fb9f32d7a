//! In-memory ledger.
//!
//! Events are kept in one vector sorted by `(timestamp, event_id)`; a
//! backfilled event is inserted at its position rather than appended.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use tollgate_core::{Budget, BudgetAlert, Period, Subscription, UsageEvent};

use crate::error::Result;
use crate::{Ledger, LedgerFilter};

/// Process-local [`Ledger`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: RwLock<Vec<UsageEvent>>,
    subscriptions: RwLock<BTreeMap<String, Subscription>>,
    budget: RwLock<Option<Budget>>,
    alerts: Mutex<BTreeMap<(Period, u32), BudgetAlert>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether no events are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Ledger for MemoryLedger {
    fn append(&self, event: &UsageEvent) -> Result<()> {
        let mut events = self.events.write();
        let at = events.partition_point(|e| (e.timestamp, e.event_id) <= (event.timestamp, event.event_id));
        events.insert(at, event.clone());
        Ok(())
    }

    fn for_each(
        &self,
        filter: &LedgerFilter,
        visit: &mut dyn FnMut(&UsageEvent) -> Result<()>,
    ) -> Result<()> {
        let events = self.events.read();
        let slice = match filter.range {
            Some(range) => {
                let lo = events.partition_point(|e| e.timestamp < range.start);
                let hi = events.partition_point(|e| e.timestamp < range.end);
                &events[lo..hi.max(lo)]
            }
            None => &events[..],
        };
        for event in slice.iter().filter(|e| filter.matches(e)) {
            visit(event)?;
        }
        Ok(())
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.subscriptions
            .write()
            .insert(subscription.provider.clone(), subscription.clone());
        Ok(())
    }

    fn get_subscription(&self, provider: &str) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().get(provider).cloned())
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.read().values().cloned().collect())
    }

    fn update_subscription(
        &self,
        provider: &str,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>> {
        let mut subscriptions = self.subscriptions.write();
        Ok(subscriptions.get_mut(provider).map(|sub| {
            update(sub);
            sub.clone()
        }))
    }

    fn put_budget(&self, budget: &Budget) -> Result<()> {
        *self.budget.write() = Some(budget.clone());
        Ok(())
    }

    fn get_budget(&self) -> Result<Option<Budget>> {
        Ok(self.budget.read().clone())
    }

    fn claim_threshold(&self, alert: &BudgetAlert) -> Result<bool> {
        let mut alerts = self.alerts.lock();
        let key = (alert.period, alert.threshold_percent);
        if alerts.contains_key(&key) {
            return Ok(false);
        }
        alerts.insert(key, alert.clone());
        Ok(true)
    }

    fn list_alerts(&self, period: Period) -> Result<Vec<BudgetAlert>> {
        Ok(self
            .alerts
            .lock()
            .range((period, 0)..=(period, u32::MAX))
            .map(|(_, alert)| alert.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tollgate_core::{AlertRule, DateRange, UsageContext, MICROS_PER_USD};

    fn at(ts: &str, cost: i64) -> UsageEvent {
        let ts: DateTime<Utc> = ts.parse().unwrap();
        UsageEvent::priced("dataforseo", "serp_organic", 1, cost, UsageContext::default().occurred_at(ts))
    }

    #[test]
    fn backfilled_events_are_read_in_time_order() {
        let ledger = MemoryLedger::new();
        ledger.append(&at("2026-10-03T00:00:00Z", 3)).unwrap();
        ledger.append(&at("2026-10-01T00:00:00Z", 1)).unwrap();
        ledger.append(&at("2026-10-02T00:00:00Z", 2)).unwrap();

        let costs: Vec<_> = ledger
            .scan(&LedgerFilter::default())
            .unwrap()
            .into_iter()
            .map(|e| e.cost_micros)
            .collect();
        assert_eq!(costs, vec![1, 2, 3]);
    }

    #[test]
    fn range_is_half_open() {
        let ledger = MemoryLedger::new();
        ledger.append(&at("2026-09-30T23:59:59Z", 1)).unwrap();
        ledger.append(&at("2026-10-01T00:00:00Z", 10)).unwrap();
        ledger.append(&at("2026-11-01T00:00:00Z", 100)).unwrap();

        let october = LedgerFilter::period(Period::new(2026, 10).unwrap());
        assert_eq!(ledger.total(&october).unwrap(), 10);
    }

    #[test]
    fn inverted_range_filter_yields_nothing() {
        let ledger = MemoryLedger::new();
        ledger.append(&at("2026-10-05T00:00:00Z", 1)).unwrap();
        let range = DateRange {
            start: "2026-10-10T00:00:00Z".parse().unwrap(),
            end: "2026-10-01T00:00:00Z".parse().unwrap(),
        };
        assert!(ledger.scan(&LedgerFilter::range(range)).unwrap().is_empty());
    }

    #[test]
    fn threshold_claim_is_first_writer_wins() {
        let ledger = MemoryLedger::new();
        let period = Period::new(2026, 10).unwrap();
        let budget = Budget::with_default_alerts(10 * MICROS_PER_USD).unwrap();
        let first = BudgetAlert::new(period, &budget, &AlertRule::log(50), 5 * MICROS_PER_USD);
        let second = BudgetAlert::new(period, &budget, &AlertRule::log(50), 6 * MICROS_PER_USD);

        assert!(ledger.claim_threshold(&first).unwrap());
        assert!(!ledger.claim_threshold(&second).unwrap());
        assert!(ledger
            .claim_threshold(&BudgetAlert::new(period.next(), &budget, &AlertRule::log(50), 0))
            .unwrap());

        let alerts = ledger.list_alerts(period).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, first.id);
    }

    #[test]
    fn update_subscription_is_none_for_unknown_provider() {
        let ledger = MemoryLedger::new();
        assert!(ledger
            .update_subscription("builtwith", &mut |_| {})
            .unwrap()
            .is_none());
    }
}
