//! Period rollups and cost breakdowns.
//!
//! Both queries read only the ledger, and the ledger returns events in
//! `(timestamp, event_id)` order, so usage over a closed period gives the
//! same answer every time it runs. Subscription commitments are not
//! versioned and always reflect the plans stored now.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tollgate_core::{
    BreakdownPoint, Budget, BudgetSummary, CostBreakdown, CostTotals, DateRange, EndpointUsage,
    MeterError, MonthlyUsage, Period, ProviderUsage, TimeBucket,
};
use tollgate_store::{GroupKey, Ledger, LedgerFilter};

/// Most buckets a single breakdown may return.
pub const MAX_BUCKETS: usize = 5_000;

/// Roll up `period` by provider and endpoint.
///
/// `costs.subscriptions` is a snapshot of the active plans at query time, not
/// the plans in force during `period`. Only usage is historical.
///
/// # Errors
///
/// Returns `ServiceUnavailable` if the ledger cannot be read.
pub fn monthly_usage(
    ledger: &dyn Ledger,
    period: Period,
    budget: Option<&Budget>,
    now: DateTime<Utc>,
) -> Result<MonthlyUsage, MeterError> {
    let rows = ledger.sum_by(
        &[GroupKey::Provider, GroupKey::Endpoint],
        &LedgerFilter::period(period),
        None,
    )?;

    let mut by_provider: BTreeMap<String, ProviderUsage> = BTreeMap::new();
    for row in rows {
        let (Some(provider), Some(endpoint)) = (row.key.provider, row.key.endpoint) else {
            continue;
        };
        let entry = by_provider
            .entry(provider.clone())
            .or_insert_with(|| ProviderUsage {
                provider,
                total_cost_micros: 0,
                total_requests: 0,
                total_quantity: 0,
                endpoints: Vec::new(),
            });
        entry.total_cost_micros = entry.total_cost_micros.saturating_add(row.cost_micros);
        entry.total_requests += row.count;
        entry.total_quantity = entry.total_quantity.saturating_add(row.quantity);
        entry.endpoints.push(EndpointUsage {
            endpoint,
            total_cost_micros: row.cost_micros,
            total_requests: row.count,
            total_quantity: row.quantity,
        });
    }

    let mut providers: Vec<ProviderUsage> = by_provider.into_values().collect();
    for provider in &mut providers {
        provider.endpoints.sort_by(|a, b| {
            b.total_cost_micros
                .cmp(&a.total_cost_micros)
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });
    }
    providers.sort_by(|a, b| {
        b.total_cost_micros
            .cmp(&a.total_cost_micros)
            .then_with(|| a.provider.cmp(&b.provider))
    });

    let usage = providers
        .iter()
        .fold(0i64, |acc, p| acc.saturating_add(p.total_cost_micros));
    let subscriptions = ledger
        .list_subscriptions()?
        .iter()
        .fold(0i64, |acc, s| acc.saturating_add(s.monthly_commitment_micros()));

    let budget = budget.map(|b| BudgetSummary {
        allocated: b.monthly_micros,
        spent: usage,
        remaining: b.monthly_micros - usage,
        percentage: b.percent_used(usage),
    });

    Ok(MonthlyUsage {
        period,
        closed: period.is_closed(now),
        providers,
        costs: CostTotals::new(usage, subscriptions),
        budget,
    })
}

/// Cost per `group_by` bucket over `range`, optionally for one provider.
///
/// Every bucket overlapping the range is present, empty ones with zero cost.
///
/// # Errors
///
/// - `InvalidDateRange` if the range spans more than [`MAX_BUCKETS`] buckets.
/// - `ServiceUnavailable` if the ledger cannot be read.
pub fn cost_breakdown(
    ledger: &dyn Ledger,
    provider: Option<String>,
    range: DateRange,
    group_by: TimeBucket,
) -> Result<CostBreakdown, MeterError> {
    let mut starts = Vec::new();
    let mut cursor = group_by.bucket_start(range.start);
    while cursor < range.end {
        if starts.len() == MAX_BUCKETS {
            return Err(MeterError::InvalidDateRange {
                start: range.start.to_rfc3339(),
                end: range.end.to_rfc3339(),
            });
        }
        starts.push(cursor);
        cursor = group_by.next_start(cursor);
    }

    let filter = LedgerFilter {
        provider: provider.clone(),
        endpoint: None,
        range: Some(range),
    };
    let rows: BTreeMap<DateTime<Utc>, (i64, u64)> = ledger
        .sum_by(&[], &filter, Some(group_by))?
        .into_iter()
        .filter_map(|row| {
            row.key
                .bucket_start
                .map(|start| (start, (row.cost_micros, row.count)))
        })
        .collect();

    let series: Vec<BreakdownPoint> = starts
        .into_iter()
        .map(|bucket_start| {
            let (cost_micros, requests) = rows.get(&bucket_start).copied().unwrap_or_default();
            BreakdownPoint {
                bucket_start,
                cost_micros,
                requests,
            }
        })
        .collect();
    let total_micros = series
        .iter()
        .fold(0i64, |acc, p| acc.saturating_add(p.cost_micros));

    Ok(CostBreakdown {
        provider,
        start: range.start,
        end: range.end,
        group_by,
        series,
        total_micros,
    })
}
