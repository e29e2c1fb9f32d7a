//! Background timers.
//!
//! Two periodic tasks run against the tracker:
//!
//! - **maintenance** (default every 5 minutes): health snapshot, subscription
//!   rollover, threshold recompute for the current period
//! - **summary report** (default daily): current month rollup and top suggestions
//!
//! Ledger work is synchronous, so each run goes through `spawn_blocking`.
//! Both tasks stop on the scheduler's [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tollgate_core::{micros_to_usd, HealthStatus, MeterError, Period};

use super::tracker::UsageTracker;

/// Timer intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maintenance interval.
    pub health_interval: Duration,
    /// Summary report interval.
    pub report_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(300),
            report_interval: Duration::from_secs(86_400),
        }
    }
}

/// What one maintenance run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceOutcome {
    /// Providers in the health snapshot.
    pub providers: usize,
    /// Providers classified degraded or unhealthy.
    pub unhealthy: Vec<String>,
    /// Subscriptions rolled over.
    pub rolled_over: usize,
    /// Highest threshold crossed in the current period.
    pub highest_threshold: Option<u32>,
    /// Steps that failed this run.
    pub failed: Vec<&'static str>,
}

impl MaintenanceOutcome {
    fn fail(&mut self, step: &'static str, error: &MeterError) {
        tracing::warn!(step, error = %error, "Maintenance step failed");
        self.failed.push(step);
    }
}

/// Running background tasks.
#[derive(Debug)]
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the timers onto the current runtime.
    #[must_use]
    pub fn start(tracker: Arc<UsageTracker>, config: SchedulerConfig) -> Self {
        let cancel = CancellationToken::new();
        let handles = vec![
            spawn_periodic(
                "maintenance",
                config.health_interval,
                cancel.clone(),
                Arc::clone(&tracker),
                |tracker| {
                    run_maintenance(tracker, Utc::now());
                },
            ),
            spawn_periodic(
                "summary_report",
                config.report_interval,
                cancel.clone(),
                tracker,
                |tracker| {
                    if let Err(e) = log_summary(tracker) {
                        tracing::warn!(error = %e, "Summary report failed");
                    }
                },
            ),
        ];
        tracing::info!(
            health_interval_secs = config.health_interval.as_secs(),
            report_interval_secs = config.report_interval.as_secs(),
            "Background timers started"
        );
        Self { cancel, handles }
    }

    /// Token that stops every task when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Background timers stopped");
    }
}

fn spawn_periodic(
    name: &'static str,
    every: Duration,
    cancel: CancellationToken,
    tracker: Arc<UsageTracker>,
    job: fn(&UsageTracker),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(task = name, "Timer shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let tracker = Arc::clone(&tracker);
                    if let Err(e) = tokio::task::spawn_blocking(move || job(&tracker)).await {
                        tracing::warn!(task = name, error = %e, "Timer run panicked");
                    }
                }
            }
        }
    })
}

/// One maintenance pass as of `now`.
///
/// The steps are independent: a failed step is logged and recorded in
/// [`MaintenanceOutcome::failed`], and the remaining steps still run.
pub fn run_maintenance(tracker: &UsageTracker, now: DateTime<Utc>) -> MaintenanceOutcome {
    let mut outcome = MaintenanceOutcome::default();

    match tracker.api_health_at(now) {
        Ok(records) => {
            for record in records
                .iter()
                .filter(|r| matches!(r.status, HealthStatus::Degraded | HealthStatus::Unhealthy))
            {
                tracing::warn!(
                    provider = %record.provider,
                    status = ?record.status,
                    success_rate = ?record.success_rate,
                    "Provider health degraded"
                );
                outcome.unhealthy.push(record.provider.clone());
            }
            outcome.providers = records.len();
        }
        Err(e) => outcome.fail("health_snapshot", &e),
    }

    match tracker.rollover_subscriptions(now) {
        Ok(rolled_over) => outcome.rolled_over = rolled_over,
        Err(e) => outcome.fail("subscription_rollover", &e),
    }

    let period = Period::containing(now);
    match tracker.recompute_thresholds(period) {
        Ok(highest) => outcome.highest_threshold = highest,
        Err(e) => outcome.fail("threshold_recompute", &e),
    }
    tracker.budget_monitor().evict_before(period.previous());

    tracing::debug!(
        providers = outcome.providers,
        unhealthy = outcome.unhealthy.len(),
        rolled_over = outcome.rolled_over,
        highest_threshold = ?outcome.highest_threshold,
        failed = ?outcome.failed,
        "Maintenance complete"
    );
    outcome
}

fn log_summary(tracker: &UsageTracker) -> Result<(), MeterError> {
    let usage = tracker.monthly_usage(None)?;
    let suggestions = tracker.optimization_suggestions()?;
    tracing::info!(
        period = %usage.period,
        usage_usd = micros_to_usd(usage.costs.usage),
        subscriptions_usd = micros_to_usd(usage.costs.subscriptions),
        total_usd = micros_to_usd(usage.costs.total),
        budget_percent = ?usage.budget.map(|b| b.percentage),
        "Monthly usage summary"
    );
    for suggestion in suggestions.suggestions.iter().take(3) {
        tracing::info!(
            kind = ?suggestion.kind,
            provider = %suggestion.provider,
            savings_usd = micros_to_usd(suggestion.potential_savings_micros),
            "{}",
            suggestion.title
        );
    }
    Ok(())
}
