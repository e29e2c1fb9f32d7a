//! Cost-optimization suggestion types and ranking.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::money::MICROS_PER_USD;

/// Heuristic that produced a suggestion. Declaration order is the tie-break
/// order when savings are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Pay-per-use spend high enough that a plan would be cheaper.
    PlanUpgrade,
    /// The same request repeated many times in a short window.
    DuplicateCalls,
    /// Billed calls that mostly fail.
    ErrorRate,
    /// Slow endpoint that would benefit from caching or batching.
    Performance,
}

/// Urgency derived from potential savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Savings ≥ $50.
    High,
    /// Savings ≥ $10.
    Medium,
    /// Anything else.
    Low,
}

impl Priority {
    /// Priority for a savings amount in micros.
    #[must_use]
    pub const fn for_savings(savings_micros: i64) -> Self {
        if savings_micros >= 50 * MICROS_PER_USD {
            Self::High
        } else if savings_micros >= 10 * MICROS_PER_USD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A ranked cost-optimization suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Heuristic tag.
    pub kind: SuggestionKind,
    /// Provider concerned.
    pub provider: String,
    /// Endpoint concerned, when the heuristic is per endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Short headline.
    pub title: String,
    /// What to do about it.
    pub recommendation: String,
    /// Estimated savings or wasted spend, in micros.
    #[serde(rename = "potential_savings", with = "crate::money::usd")]
    pub potential_savings_micros: i64,
    /// Urgency.
    pub priority: Priority,
}

impl Suggestion {
    /// Build a suggestion; priority follows from the savings.
    #[must_use]
    pub fn new(
        kind: SuggestionKind,
        provider: impl Into<String>,
        endpoint: Option<String>,
        title: impl Into<String>,
        recommendation: impl Into<String>,
        potential_savings_micros: i64,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            endpoint,
            title: title.into(),
            recommendation: recommendation.into(),
            potential_savings_micros,
            priority: Priority::for_savings(potential_savings_micros),
        }
    }

    /// Ranking order: savings descending, then kind, provider, endpoint.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .potential_savings_micros
            .cmp(&self.potential_savings_micros)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.provider.cmp(&other.provider))
            .then_with(|| self.endpoint.cmp(&other.endpoint))
    }
}

/// Suggestions in rank order plus their combined savings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionReport {
    /// Ranked suggestions.
    pub suggestions: Vec<Suggestion>,
    /// Sum of `potential_savings`.
    #[serde(rename = "totalPotentialSavings", with = "crate::money::usd")]
    pub total_potential_savings_micros: i64,
}

impl SuggestionReport {
    /// Rank suggestions and total their savings.
    #[must_use]
    pub fn ranked(mut suggestions: Vec<Suggestion>) -> Self {
        suggestions.sort_by(Suggestion::rank_cmp);
        let total_potential_savings_micros = suggestions
            .iter()
            .fold(0i64, |acc, s| acc.saturating_add(s.potential_savings_micros));
        Self {
            suggestions,
            total_potential_savings_micros,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(kind: SuggestionKind, provider: &str, savings_usd: i64) -> Suggestion {
        Suggestion::new(kind, provider, None, "t", "r", savings_usd * MICROS_PER_USD)
    }

    #[test]
    fn higher_savings_rank_first() {
        let report = SuggestionReport::ranked(vec![
            s(SuggestionKind::ErrorRate, "a", 30),
            s(SuggestionKind::Performance, "b", 0),
            s(SuggestionKind::DuplicateCalls, "c", 50),
        ]);
        let savings: Vec<_> = report
            .suggestions
            .iter()
            .map(|s| s.potential_savings_micros / MICROS_PER_USD)
            .collect();
        assert_eq!(savings, vec![50, 30, 0]);
        assert_eq!(report.total_potential_savings_micros, 80 * MICROS_PER_USD);
    }

    #[test]
    fn total_savings_saturate() {
        let big = |provider: &str| {
            Suggestion::new(SuggestionKind::PlanUpgrade, provider, None, "t", "r", i64::MAX)
        };
        let report = SuggestionReport::ranked(vec![big("a"), big("b")]);
        assert_eq!(report.suggestions.len(), 2);
        assert_eq!(report.total_potential_savings_micros, i64::MAX);
    }

    #[test]
    fn ties_break_on_kind_then_provider() {
        let report = SuggestionReport::ranked(vec![
            s(SuggestionKind::ErrorRate, "a", 10),
            s(SuggestionKind::PlanUpgrade, "z", 10),
            s(SuggestionKind::PlanUpgrade, "b", 10),
        ]);
        let order: Vec<_> = report
            .suggestions
            .iter()
            .map(|s| (s.kind, s.provider.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (SuggestionKind::PlanUpgrade, "b"),
                (SuggestionKind::PlanUpgrade, "z"),
                (SuggestionKind::ErrorRate, "a"),
            ]
        );
    }

    #[test]
    fn priority_bands() {
        assert_eq!(Priority::for_savings(50 * MICROS_PER_USD), Priority::High);
        assert_eq!(Priority::for_savings(10 * MICROS_PER_USD), Priority::Medium);
        assert_eq!(Priority::for_savings(9_999_999), Priority::Low);
    }
}
