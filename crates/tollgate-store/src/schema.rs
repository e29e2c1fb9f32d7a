//! Column families of the `RocksDB` backend.

/// Column family names.
pub mod cf {
    /// Usage events keyed by `timestamp_micros || event_id`.
    pub const USAGE_EVENTS: &str = "usage_events";

    /// Subscriptions keyed by provider name.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Singleton records (the budget).
    pub const META: &str = "meta";

    /// Fired budget alerts keyed by `period || threshold`.
    pub const BUDGET_ALERTS: &str = "budget_alerts";
}

/// Key of the budget record in [`cf::META`].
pub const BUDGET_KEY: &[u8] = b"budget";

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::USAGE_EVENTS,
        cf::SUBSCRIPTIONS,
        cf::META,
        cf::BUDGET_ALERTS,
    ]
}
