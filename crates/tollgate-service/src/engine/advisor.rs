//! Cost optimization heuristics.
//!
//! | kind | looks at | savings |
//! |---|---|---|
//! | `plan_upgrade` | pay-per-use provider spend this month | 30% of spend |
//! | `error_rate` | endpoints with a low success rate this month | spend on failed calls |
//! | `performance` | endpoints slower than the threshold this month | none |
//! | `duplicate_calls` | identical requests in the trailing window | 80% of their spend |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::{
    micros_to_usd, usd_to_micros, BillingType, DateRange, MeterError, Period, ProviderRegistry,
    Suggestion, SuggestionKind, SuggestionReport,
};
use tollgate_store::{GroupKey, GroupedSum, Ledger, LedgerFilter};

/// Heuristic thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Monthly pay-per-use spend above which a plan is suggested.
    pub plan_upgrade_threshold_usd: f64,
    /// Success rate below which an endpoint is flagged.
    pub error_rate_threshold: f64,
    /// Requests an endpoint needs before its error rate counts.
    pub error_rate_min_requests: u64,
    /// Mean response time above which an endpoint is flagged.
    pub slow_response_ms: f64,
    /// Calls of one request signature in the window that count as duplicates.
    pub duplicate_threshold: u64,
    /// Trailing window for duplicate detection.
    pub duplicate_window_minutes: i64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            plan_upgrade_threshold_usd: 100.0,
            error_rate_threshold: 0.9,
            error_rate_min_requests: 5,
            slow_response_ms: 2_000.0,
            duplicate_threshold: 10,
            duplicate_window_minutes: 60,
        }
    }
}

/// Mines the ledger for savings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizationAdvisor {
    config: AdvisorConfig,
}

impl OptimizationAdvisor {
    /// Advisor with the given thresholds.
    #[must_use]
    pub const fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Ranked suggestions as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn suggest(
        &self,
        ledger: &dyn Ledger,
        registry: &ProviderRegistry,
        now: DateTime<Utc>,
    ) -> Result<SuggestionReport, MeterError> {
        let month = LedgerFilter::period(Period::containing(now));
        let mut suggestions = Vec::new();

        let providers = ledger.sum_by(&[GroupKey::Provider], &month, None)?;
        suggestions.extend(self.plan_upgrades(&providers, registry));

        let endpoints = ledger.sum_by(&[GroupKey::Provider, GroupKey::Endpoint], &month, None)?;
        suggestions.extend(self.error_rates(&endpoints));
        suggestions.extend(self.slow_endpoints(&endpoints));

        let window = LedgerFilter::range(DateRange {
            start: now - Duration::minutes(self.config.duplicate_window_minutes),
            end: now + Duration::microseconds(1),
        });
        let signatures = ledger.sum_by(
            &[GroupKey::Provider, GroupKey::Endpoint, GroupKey::Path],
            &window,
            None,
        )?;
        suggestions.extend(self.duplicates(&signatures));

        Ok(SuggestionReport::ranked(suggestions))
    }

    fn plan_upgrades(&self, rows: &[GroupedSum], registry: &ProviderRegistry) -> Vec<Suggestion> {
        let threshold = usd_to_micros(self.config.plan_upgrade_threshold_usd);
        rows.iter()
            .filter_map(|row| {
                let name = row.key.provider.as_deref()?;
                let provider = registry.get(name)?;
                (provider.billing_type == BillingType::PayPerUse && row.cost_micros > threshold)
                    .then(|| {
                        Suggestion::new(
                            SuggestionKind::PlanUpgrade,
                            name,
                            None,
                            format!("Consider a subscription plan for {name}"),
                            format!(
                                "Pay-per-use spend is ${:.2} this month; a committed plan typically saves around 30%",
                                micros_to_usd(row.cost_micros)
                            ),
                            row.cost_micros.saturating_mul(3) / 10,
                        )
                    })
            })
            .collect()
    }

    fn error_rates(&self, rows: &[GroupedSum]) -> Vec<Suggestion> {
        rows.iter()
            .filter(|row| row.count >= self.config.error_rate_min_requests)
            .filter_map(|row| {
                let rate = row.success_rate()?;
                if rate >= self.config.error_rate_threshold {
                    return None;
                }
                let failed = row.count - row.successes;
                let wasted = i128::from(row.cost_micros) * i128::from(failed)
                    / i128::from(row.count.max(1));
                Some(Suggestion::new(
                    SuggestionKind::ErrorRate,
                    row.key.provider.clone()?,
                    row.key.endpoint.clone(),
                    format!(
                        "High error rate on {}",
                        row.key.endpoint.as_deref().unwrap_or_default()
                    ),
                    format!(
                        "{:.1}% of {} calls failed; validate inputs before calling to stop paying for failures",
                        (1.0 - rate) * 100.0,
                        row.count
                    ),
                    i64::try_from(wasted).unwrap_or(i64::MAX),
                ))
            })
            .collect()
    }

    fn slow_endpoints(&self, rows: &[GroupedSum]) -> Vec<Suggestion> {
        rows.iter()
            .filter_map(|row| {
                let avg = row.avg_response_ms()?;
                if avg <= self.config.slow_response_ms {
                    return None;
                }
                Some(Suggestion::new(
                    SuggestionKind::Performance,
                    row.key.provider.clone()?,
                    row.key.endpoint.clone(),
                    format!(
                        "Slow responses from {}",
                        row.key.endpoint.as_deref().unwrap_or_default()
                    ),
                    format!("Average response time is {avg:.0} ms; cache or batch these calls"),
                    0,
                ))
            })
            .collect()
    }

    fn duplicates(&self, rows: &[GroupedSum]) -> Vec<Suggestion> {
        rows.iter()
            .filter(|row| row.key.path.is_some() && row.count > self.config.duplicate_threshold)
            .filter_map(|row| {
                Some(Suggestion::new(
                    SuggestionKind::DuplicateCalls,
                    row.key.provider.clone()?,
                    row.key.endpoint.clone(),
                    format!(
                        "Repeated identical calls to {}",
                        row.key.endpoint.as_deref().unwrap_or_default()
                    ),
                    format!(
                        "{} identical requests in the last {} minutes; cache the response",
                        row.count, self.config.duplicate_window_minutes
                    ),
                    row.cost_micros.saturating_mul(8) / 10,
                ))
            })
            .collect()
    }
}
