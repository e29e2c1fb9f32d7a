//! Error types for tollgate.

use crate::ids::IdError;

/// Result type for tollgate operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur in tollgate operations.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// A provider with this name is already registered.
    #[error("duplicate provider: {provider}")]
    DuplicateProvider {
        /// The provider name.
        provider: String,
    },

    /// An endpoint name is used twice within one provider.
    #[error("duplicate endpoint: {provider}/{endpoint}")]
    DuplicateEndpoint {
        /// The provider name.
        provider: String,
        /// The endpoint name.
        endpoint: String,
    },

    /// Endpoint definition is invalid (negative unit cost, empty name).
    #[error("invalid endpoint {provider}/{endpoint}: {reason}")]
    InvalidEndpoint {
        /// The provider name.
        provider: String,
        /// The endpoint name.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Budget amount is not positive or an alert rule is malformed.
    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    /// Subscription plan is malformed.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Export format is not supported.
    #[error("invalid format: {0} (expected json or csv)")]
    InvalidFormat(String),

    /// Unknown time-bucket granularity.
    #[error("invalid grouping: {0} (expected day, week or month)")]
    InvalidGrouping(String),

    /// Malformed `YYYY-MM` period.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// Empty or inverted date range.
    #[error("invalid date range: {start} .. {end}")]
    InvalidDateRange {
        /// Range start.
        start: String,
        /// Range end.
        end: String,
    },

    /// The ledger store could not serve a read query.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}
