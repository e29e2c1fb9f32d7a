//! Provider subscriptions.
//!
//! A [`Subscription`] is the organisation's own plan with a provider, as
//! opposed to the [`SubscriptionTerms`](crate::provider::SubscriptionTerms)
//! the provider advertises. Only `active` subscriptions count toward the
//! monthly commitment.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};
use crate::provider::BillingPeriod;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and renewing.
    #[default]
    Active,
    /// Will not renew; expires at the renewal date.
    Cancelled,
    /// Lapsed.
    Expired,
    /// Free trial; expires at the renewal date.
    Trial,
}

/// Plan details supplied on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Plan name as sold by the provider.
    pub name: String,

    /// Cost per billing cycle in micros.
    #[serde(rename = "cost", with = "crate::money::usd")]
    pub cost_micros: i64,

    /// Billing cycle.
    pub billing_period: BillingPeriod,

    /// Lifecycle state.
    #[serde(default)]
    pub status: SubscriptionStatus,

    /// Next renewal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<DateTime<Utc>>,

    /// Credits included per cycle.
    #[serde(default)]
    pub credits_total: u64,

    /// Requests included per cycle.
    #[serde(default)]
    pub requests_total: u64,
}

impl SubscriptionPlan {
    /// Check the plan is well formed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubscription` for an empty name or a negative cost.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MeterError::InvalidSubscription("plan name is empty".into()));
        }
        if self.cost_micros < 0 {
            return Err(MeterError::InvalidSubscription(format!(
                "negative cost for plan {}",
                self.name
            )));
        }
        Ok(())
    }
}

/// A used/total pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Consumed this cycle.
    pub used: u64,
    /// Included per cycle (0 = unlimited or unknown).
    pub total: u64,
}

impl UsageCounter {
    /// Remaining allowance, if the total is known.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        (self.total > 0).then(|| self.total.saturating_sub(self.used))
    }
}

/// Per-cycle consumption of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUsage {
    /// Credits consumed (sum of event quantities).
    pub credits: UsageCounter,
    /// Requests made.
    pub requests: UsageCounter,
}

/// The organisation's subscription with one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Provider name; one subscription per provider.
    pub provider: String,

    /// Plan details.
    pub plan: SubscriptionPlan,

    /// Consumption in the current cycle.
    pub usage: SubscriptionUsage,

    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a subscription with zeroed counters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubscription` if the plan is malformed.
    pub fn new(provider: impl Into<String>, plan: SubscriptionPlan, now: DateTime<Utc>) -> Result<Self> {
        plan.validate()?;
        let usage = SubscriptionUsage {
            credits: UsageCounter {
                used: 0,
                total: plan.credits_total,
            },
            requests: UsageCounter {
                used: 0,
                total: plan.requests_total,
            },
        };
        Ok(Self {
            provider: provider.into(),
            plan,
            usage,
            updated_at: now,
        })
    }

    /// Replace the plan, keeping this cycle's consumption.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubscription` if the plan is malformed.
    pub fn apply_plan(&mut self, plan: SubscriptionPlan, now: DateTime<Utc>) -> Result<()> {
        plan.validate()?;
        self.usage.credits.total = plan.credits_total;
        self.usage.requests.total = plan.requests_total;
        self.plan = plan;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the subscription counts toward the monthly commitment.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.plan.status == SubscriptionStatus::Active
    }

    /// Cost normalised to one month (`yearly / 12`), regardless of status.
    #[must_use]
    pub fn monthly_equivalent_micros(&self) -> i64 {
        self.plan.billing_period.monthly_equivalent(self.plan.cost_micros)
    }

    /// Monthly commitment: the monthly equivalent when active, else 0.
    #[must_use]
    pub fn monthly_commitment_micros(&self) -> i64 {
        if self.is_active() {
            self.monthly_equivalent_micros()
        } else {
            0
        }
    }

    /// Count one call consuming `quantity` credits.
    pub fn record_call(&mut self, quantity: u64, now: DateTime<Utc>) {
        self.usage.requests.used = self.usage.requests.used.saturating_add(1);
        self.usage.credits.used = self.usage.credits.used.saturating_add(quantity);
        self.updated_at = now;
    }

    /// Apply renewal-date rollover.
    ///
    /// Once the renewal date has passed, an active subscription advances by
    /// whole billing periods and resets its counters, while cancelled and
    /// trial subscriptions expire. Returns whether anything changed.
    pub fn rollover(&mut self, now: DateTime<Utc>) -> bool {
        let Some(renewal) = self.plan.renewal_date else {
            return false;
        };
        if renewal > now {
            return false;
        }

        match self.plan.status {
            SubscriptionStatus::Active => {
                let step = Months::new(self.plan.billing_period.months());
                let mut next = renewal;
                while next <= now {
                    match next.checked_add_months(step) {
                        Some(advanced) => next = advanced,
                        None => break,
                    }
                }
                self.plan.renewal_date = Some(next);
                self.usage.credits.used = 0;
                self.usage.requests.used = 0;
            }
            SubscriptionStatus::Cancelled | SubscriptionStatus::Trial => {
                self.plan.status = SubscriptionStatus::Expired;
            }
            SubscriptionStatus::Expired => return false,
        }
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn plan(period: BillingPeriod, status: SubscriptionStatus) -> SubscriptionPlan {
        SubscriptionPlan {
            name: "basic".into(),
            cost_micros: 1_200_000_000,
            billing_period: period,
            status,
            renewal_date: Some(ts("2026-01-15T00:00:00Z")),
            credits_total: 2_000,
            requests_total: 0,
        }
    }

    #[test]
    fn yearly_plan_commits_a_twelfth() {
        let sub = Subscription::new(
            "semrush",
            plan(BillingPeriod::Yearly, SubscriptionStatus::Active),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sub.monthly_commitment_micros(), 100_000_000);
    }

    #[test]
    fn only_active_subscriptions_commit() {
        let sub = Subscription::new(
            "builtwith",
            plan(BillingPeriod::Monthly, SubscriptionStatus::Trial),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sub.monthly_commitment_micros(), 0);
        assert_eq!(sub.monthly_equivalent_micros(), 1_200_000_000);
    }

    #[test]
    fn negative_cost_is_rejected() {
        let mut bad = plan(BillingPeriod::Monthly, SubscriptionStatus::Active);
        bad.cost_micros = -1;
        assert!(matches!(
            Subscription::new("x", bad, Utc::now()),
            Err(MeterError::InvalidSubscription(_))
        ));
    }

    #[test]
    fn active_rollover_advances_whole_periods_and_resets() {
        let mut sub = Subscription::new(
            "builtwith",
            plan(BillingPeriod::Monthly, SubscriptionStatus::Active),
            Utc::now(),
        )
        .unwrap();
        sub.record_call(40, Utc::now());
        assert_eq!(sub.usage.credits.used, 40);
        assert_eq!(sub.usage.credits.remaining(), Some(1_960));

        assert!(sub.rollover(ts("2026-03-20T00:00:00Z")));
        assert_eq!(sub.plan.renewal_date, Some(ts("2026-04-15T00:00:00Z")));
        assert_eq!(sub.usage.credits.used, 0);
        assert_eq!(sub.usage.requests.used, 0);

        // Nothing to do until the new renewal date.
        assert!(!sub.rollover(ts("2026-04-01T00:00:00Z")));
    }

    #[test]
    fn cancelled_and_trial_expire_on_renewal() {
        for status in [SubscriptionStatus::Cancelled, SubscriptionStatus::Trial] {
            let mut sub = Subscription::new("p", plan(BillingPeriod::Monthly, status), Utc::now()).unwrap();
            assert!(sub.rollover(ts("2026-01-15T00:00:00Z")));
            assert_eq!(sub.plan.status, SubscriptionStatus::Expired);
            assert!(!sub.rollover(ts("2026-06-01T00:00:00Z")));
        }
    }

    #[test]
    fn apply_plan_keeps_consumption() {
        let mut sub = Subscription::new(
            "p",
            plan(BillingPeriod::Monthly, SubscriptionStatus::Active),
            Utc::now(),
        )
        .unwrap();
        sub.record_call(3, Utc::now());
        let mut upgraded = plan(BillingPeriod::Monthly, SubscriptionStatus::Active);
        upgraded.credits_total = 5_000;
        sub.apply_plan(upgraded, Utc::now()).unwrap();
        assert_eq!(sub.usage.credits, UsageCounter { used: 3, total: 5_000 });
    }
}
