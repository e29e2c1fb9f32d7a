//! Provider health classification.
//!
//! Health is derived from the ledger, never stored. [`HealthStats`] folds the
//! events of one provider in a trailing window and produces a
//! [`HealthRecord`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::UsageEvent;

/// Success rate at or above which a provider is healthy.
pub const HEALTHY_SUCCESS_RATE: f64 = 0.99;

/// Success rate at or above which a provider is degraded rather than unhealthy.
pub const DEGRADED_SUCCESS_RATE: f64 = 0.95;

/// Health classification of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Success rate ≥ 0.99.
    Healthy,
    /// Success rate ≥ 0.95.
    Degraded,
    /// Success rate below 0.95.
    Unhealthy,
    /// No traffic in the window.
    Unknown,
}

impl HealthStatus {
    /// Classify a success rate.
    #[must_use]
    pub fn classify(success_rate: f64) -> Self {
        if success_rate >= HEALTHY_SUCCESS_RATE {
            Self::Healthy
        } else if success_rate >= DEGRADED_SUCCESS_RATE {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

/// Requests in the last minute against the provider's per-minute quota.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitHeadroom {
    /// Configured requests per minute, if any.
    pub limit_per_minute: Option<u32>,
    /// Requests seen in the last 60 seconds.
    pub requests_last_minute: u64,
    /// `requests / limit * 100`.
    pub usage_percent: Option<f64>,
    /// `100 - usage_percent`, floored at 0.
    pub headroom_percent: Option<f64>,
}

impl RateLimitHeadroom {
    /// Compute headroom for a request count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(limit_per_minute: Option<u32>, requests_last_minute: u64) -> Self {
        let usage_percent = limit_per_minute
            .filter(|limit| *limit > 0)
            .map(|limit| requests_last_minute as f64 * 100.0 / f64::from(limit));
        Self {
            limit_per_minute,
            requests_last_minute,
            usage_percent,
            headroom_percent: usage_percent.map(|u| (100.0 - u).max(0.0)),
        }
    }
}

/// Rolling health of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Provider name.
    pub provider: String,
    /// Classification.
    pub status: HealthStatus,
    /// Requests in the window.
    pub total_requests: u64,
    /// Successful requests in the window.
    pub successful_requests: u64,
    /// `successful / total`; `None` without traffic.
    pub success_rate: Option<f64>,
    /// Mean response time over events that report one.
    pub avg_response_ms: Option<f64>,
    /// Nearest-rank 95th percentile response time.
    pub p95_response_ms: Option<u64>,
    /// Rate-limit headroom.
    pub rate_limit: RateLimitHeadroom,
    /// Most recent event in the window.
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Accumulator for one provider's events in a window.
#[derive(Debug, Clone, Default)]
pub struct HealthStats {
    total: u64,
    successful: u64,
    response_times: Vec<u64>,
    last_minute: u64,
    last_request_at: Option<DateTime<Utc>>,
}

impl HealthStats {
    /// Fold one event; `now` anchors the 60-second rate window.
    pub fn observe(&mut self, event: &UsageEvent, now: DateTime<Utc>) {
        self.total += 1;
        if event.success {
            self.successful += 1;
        }
        if let Some(ms) = event.response_time_ms {
            self.response_times.push(ms);
        }
        if event.timestamp > now - Duration::seconds(60) && event.timestamp <= now {
            self.last_minute += 1;
        }
        if self.last_request_at.map_or(true, |last| event.timestamp > last) {
            self.last_request_at = Some(event.timestamp);
        }
    }

    /// Produce the record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(mut self, provider: impl Into<String>, limit_per_minute: Option<u32>) -> HealthRecord {
        let success_rate = (self.total > 0).then(|| self.successful as f64 / self.total as f64);
        let status = success_rate.map_or(HealthStatus::Unknown, HealthStatus::classify);
        // Collectors may report any u64, so sum wide.
        let avg_response_ms = (!self.response_times.is_empty()).then(|| {
            let total: u128 = self.response_times.iter().map(|&ms| u128::from(ms)).sum();
            total as f64 / self.response_times.len() as f64
        });
        self.response_times.sort_unstable();
        HealthRecord {
            provider: provider.into(),
            status,
            total_requests: self.total,
            successful_requests: self.successful,
            success_rate,
            avg_response_ms,
            p95_response_ms: percentile_nearest_rank(&self.response_times, 95),
            rate_limit: RateLimitHeadroom::new(limit_per_minute, self.last_minute),
            last_request_at: self.last_request_at,
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
#[must_use]
pub fn percentile_nearest_rank(sorted: &[u64], pct: u32) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    // rank = ceil(pct/100 * n), 1-based
    let rank = (usize::try_from(pct).unwrap_or(100) * n).div_ceil(100).max(1);
    sorted.get(rank.min(n) - 1).copied()
}
