//! Provider health over a trailing window.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use tollgate_core::{HealthRecord, HealthStats, MeterError, ProviderRegistry};
use tollgate_store::{Ledger, LedgerFilter};

/// Derives per-provider health from the ledger.
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    window: Duration,
}

impl HealthMonitor {
    /// Monitor over the trailing `window`.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Trailing window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// One record per registered provider, plus unregistered providers seen
    /// in the window, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the ledger cannot be read.
    pub fn snapshot(
        &self,
        ledger: &dyn Ledger,
        registry: &ProviderRegistry,
        now: DateTime<Utc>,
    ) -> Result<Vec<HealthRecord>, MeterError> {
        let mut stats: BTreeMap<String, HealthStats> = registry
            .providers()
            .map(|p| (p.name.clone(), HealthStats::default()))
            .collect();

        // Include `now` itself so an event stamped this instant is counted.
        let filter = LedgerFilter {
            range: Some(tollgate_core::DateRange {
                start: now - self.window,
                end: now + Duration::microseconds(1),
            }),
            ..LedgerFilter::default()
        };
        ledger.for_each(&filter, &mut |event| {
            stats
                .entry(event.provider.clone())
                .or_default()
                .observe(event, now);
            Ok(())
        })?;

        Ok(stats
            .into_iter()
            .map(|(provider, s)| {
                let limit = registry
                    .get(&provider)
                    .and_then(|p| p.rate_limits.requests_per_minute);
                s.finish(provider, limit)
            })
            .collect())
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::{HealthStatus, UsageContext, UsageEvent};
    use tollgate_store::MemoryLedger;

    fn now() -> DateTime<Utc> {
        "2026-10-16T12:00:00Z".parse().unwrap()
    }

    fn call(provider: &str, seconds_ago: i64, status: u16, ms: u64) -> UsageEvent {
        UsageEvent::priced(
            provider,
            "serp_organic",
            1,
            2_000,
            UsageContext::default()
                .with_status(status)
                .with_response_time(ms)
                .occurred_at(now() - Duration::seconds(seconds_ago)),
        )
    }

    #[test]
    fn every_registered_provider_is_listed() {
        let ledger = MemoryLedger::new();
        let registry = ProviderRegistry::with_defaults();
        let records = HealthMonitor::default()
            .snapshot(&ledger, &registry, now())
            .unwrap();

        assert_eq!(records.len(), registry.len());
        assert!(records.iter().all(|r| r.status == HealthStatus::Unknown));
        assert!(records.windows(2).all(|w| w[0].provider < w[1].provider));
    }

    #[test]
    fn classifies_and_reports_headroom() {
        let ledger = MemoryLedger::new();
        for i in 0..19 {
            ledger.append(&call("dataforseo", 30 + i, 200, 100)).unwrap();
        }
        ledger.append(&call("dataforseo", 10, 500, 900)).unwrap();
        // Outside the window.
        ledger.append(&call("dataforseo", 25 * 3600, 500, 10)).unwrap();

        let registry = ProviderRegistry::with_defaults();
        let records = HealthMonitor::default()
            .snapshot(&ledger, &registry, now())
            .unwrap();
        let dfs = records.iter().find(|r| r.provider == "dataforseo").unwrap();

        assert_eq!(dfs.total_requests, 20);
        assert_eq!(dfs.successful_requests, 19);
        assert_eq!(dfs.status, HealthStatus::Degraded);
        assert_eq!(dfs.p95_response_ms, Some(100));
        assert_eq!(dfs.rate_limit.limit_per_minute, Some(2_000));
        assert_eq!(dfs.rate_limit.requests_last_minute, 20);
        assert_eq!(dfs.rate_limit.usage_percent, Some(1.0));
    }

    #[test]
    fn unregistered_providers_seen_in_window_are_listed() {
        let ledger = MemoryLedger::new();
        ledger.append(&call("ghost_provider", 5, 200, 50)).unwrap();
        let records = HealthMonitor::default()
            .snapshot(&ledger, &ProviderRegistry::new(), now())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, HealthStatus::Healthy);
        assert_eq!(records[0].rate_limit.limit_per_minute, None);
    }
}
