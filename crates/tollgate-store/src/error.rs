//! Error types for tollgate storage.

use tollgate_core::MeterError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored key does not have the expected layout.
    #[error("corrupt key in {column_family}: {len} bytes")]
    CorruptKey {
        /// Column family holding the key.
        column_family: &'static str,
        /// Length of the key found.
        len: usize,
    },
}

/// Any storage failure seen by a reader means the ledger cannot be trusted to
/// answer right now.
impl From<StoreError> for MeterError {
    fn from(err: StoreError) -> Self {
        Self::ServiceUnavailable(err.to_string())
    }
}
