//! Monthly budget and threshold alerts.
//!
//! A threshold `t` is crossed once `spent * 100 >= t * budget`. The test is
//! done in integer micros so that the same spend always crosses the same
//! thresholds, no matter how it was accumulated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};
use crate::ids::AlertId;
use crate::period::Period;

/// Default alert ladder.
pub const DEFAULT_THRESHOLDS: [u32; 4] = [50, 75, 90, 100];

/// What to do when a threshold is crossed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertAction {
    /// Emit a warning log.
    #[default]
    Log,
    /// POST the alert to a URL.
    Webhook {
        /// Target URL.
        url: String,
    },
}

/// One rung of the alert ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Percentage of the monthly budget.
    pub threshold_percent: u32,

    /// Delivery action.
    #[serde(default)]
    pub action: AlertAction,
}

impl AlertRule {
    /// A log-only rule.
    #[must_use]
    pub const fn log(threshold_percent: u32) -> Self {
        Self {
            threshold_percent,
            action: AlertAction::Log,
        }
    }
}

/// The single monthly budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Allocated amount per calendar month, in micros.
    #[serde(rename = "monthly", with = "crate::money::usd")]
    pub monthly_micros: i64,

    /// Alert ladder, ascending and without duplicate thresholds.
    pub alerts: Vec<AlertRule>,

    /// When the budget was last set.
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Validate and normalise a budget.
    ///
    /// Rules are sorted ascending by threshold; for a repeated threshold the
    /// first rule wins. An empty list gets the default ladder.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBudget` for a non-positive amount or a zero threshold.
    pub fn new(monthly_micros: i64, alerts: Vec<AlertRule>) -> Result<Self> {
        if monthly_micros <= 0 {
            return Err(MeterError::InvalidBudget(format!(
                "monthly amount must be positive, got {monthly_micros} micros"
            )));
        }
        if let Some(rule) = alerts.iter().find(|r| r.threshold_percent == 0) {
            return Err(MeterError::InvalidBudget(format!(
                "threshold must be positive, got {}",
                rule.threshold_percent
            )));
        }
        if alerts
            .iter()
            .any(|r| matches!(&r.action, AlertAction::Webhook { url } if url.trim().is_empty()))
        {
            return Err(MeterError::InvalidBudget("webhook url is empty".into()));
        }

        let mut alerts = if alerts.is_empty() {
            DEFAULT_THRESHOLDS.into_iter().map(AlertRule::log).collect()
        } else {
            alerts
        };
        // Stable sort keeps the first rule of a repeated threshold in front.
        alerts.sort_by_key(|r| r.threshold_percent);
        alerts.dedup_by_key(|r| r.threshold_percent);

        Ok(Self {
            monthly_micros,
            alerts,
            updated_at: Utc::now(),
        })
    }

    /// A budget with the default 50/75/90/100 ladder.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBudget` for a non-positive amount.
    pub fn with_default_alerts(monthly_micros: i64) -> Result<Self> {
        Self::new(monthly_micros, Vec::new())
    }

    /// Whether `spent` reaches `threshold_percent` of the budget.
    #[must_use]
    pub fn is_crossed(&self, threshold_percent: u32, spent_micros: i64) -> bool {
        i128::from(spent_micros) * 100
            >= i128::from(threshold_percent) * i128::from(self.monthly_micros)
    }

    /// Rules crossed at `spent`, ascending.
    pub fn crossed(&self, spent_micros: i64) -> impl Iterator<Item = &AlertRule> {
        self.alerts
            .iter()
            .filter(move |r| self.is_crossed(r.threshold_percent, spent_micros))
    }

    /// Highest threshold crossed at `spent`, if any.
    #[must_use]
    pub fn highest_crossed(&self, spent_micros: i64) -> Option<u32> {
        self.crossed(spent_micros).map(|r| r.threshold_percent).last()
    }

    /// Spend as a percentage of the budget.
    #[must_use]
    pub fn percent_used(&self, spent_micros: i64) -> f64 {
        crate::money::percent_of(spent_micros, self.monthly_micros).unwrap_or(0.0)
    }

    /// The rule for a threshold.
    #[must_use]
    pub fn rule(&self, threshold_percent: u32) -> Option<&AlertRule> {
        self.alerts
            .iter()
            .find(|r| r.threshold_percent == threshold_percent)
    }
}

/// A fired threshold alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// Alert id.
    pub id: AlertId,

    /// Accounting period the alert belongs to.
    pub period: Period,

    /// Threshold that was crossed.
    pub threshold_percent: u32,

    /// Period spend when the alert fired.
    #[serde(rename = "spent", with = "crate::money::usd")]
    pub spent_micros: i64,

    /// Budget in force when the alert fired.
    #[serde(rename = "budget", with = "crate::money::usd")]
    pub budget_micros: i64,

    /// `spent / budget * 100`.
    pub percent_used: f64,

    /// Delivery action of the rule.
    pub action: AlertAction,

    /// When the alert fired.
    pub fired_at: DateTime<Utc>,
}

impl BudgetAlert {
    /// Build an alert for `rule` at the given spend.
    #[must_use]
    pub fn new(period: Period, budget: &Budget, rule: &AlertRule, spent_micros: i64) -> Self {
        Self {
            id: AlertId::generate(),
            period,
            threshold_percent: rule.threshold_percent,
            spent_micros,
            budget_micros: budget.monthly_micros,
            percent_used: budget.percent_used(spent_micros),
            action: rule.action.clone(),
            fired_at: Utc::now(),
        }
    }

    /// Whether spend has exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.spent_micros > self.budget_micros
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::MICROS_PER_USD;

    fn hundred() -> Budget {
        Budget::with_default_alerts(100 * MICROS_PER_USD).unwrap()
    }

    #[test]
    fn non_positive_budget_is_rejected() {
        assert!(matches!(Budget::new(0, vec![]), Err(MeterError::InvalidBudget(_))));
        assert!(matches!(Budget::new(-5, vec![]), Err(MeterError::InvalidBudget(_))));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = Budget::new(MICROS_PER_USD, vec![AlertRule::log(0)]).unwrap_err();
        assert!(matches!(err, MeterError::InvalidBudget(_)));
    }

    #[test]
    fn rules_are_sorted_and_deduplicated() {
        let budget = Budget::new(
            MICROS_PER_USD,
            vec![
                AlertRule::log(90),
                AlertRule {
                    threshold_percent: 50,
                    action: AlertAction::Webhook {
                        url: "http://hooks.local/a".into(),
                    },
                },
                AlertRule::log(50),
            ],
        )
        .unwrap();
        let thresholds: Vec<_> = budget.alerts.iter().map(|r| r.threshold_percent).collect();
        assert_eq!(thresholds, vec![50, 90]);
        assert!(matches!(budget.alerts[0].action, AlertAction::Webhook { .. }));
    }

    #[test]
    fn crossing_is_inclusive_and_exact() {
        let budget = hundred();
        assert_eq!(budget.highest_crossed(49_999_999), None);
        assert_eq!(budget.highest_crossed(50 * MICROS_PER_USD), Some(50));
        assert_eq!(budget.highest_crossed(120 * MICROS_PER_USD), Some(100));
        assert_eq!(budget.crossed(120 * MICROS_PER_USD).count(), 4);
    }

    #[test]
    fn one_large_spend_crosses_every_rung() {
        let budget = Budget::with_default_alerts(10 * MICROS_PER_USD).unwrap();
        let crossed: Vec<_> = budget
            .crossed(11 * MICROS_PER_USD)
            .map(|r| r.threshold_percent)
            .collect();
        assert_eq!(crossed, vec![50, 75, 90, 100]);
    }

    #[test]
    fn budget_json_uses_usd() {
        let budget: Budget = serde_json::from_str(
            r#"{"monthly":250.0,"alerts":[{"threshold_percent":80,"action":{"type":"webhook","url":"http://x"}}],
                "updated_at":"2026-10-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(budget.monthly_micros, 250 * MICROS_PER_USD);
        assert_eq!(
            budget.alerts[0].action,
            AlertAction::Webhook { url: "http://x".into() }
        );
    }
}
