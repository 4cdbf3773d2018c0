//! Error types for the storage layer.
//!
//! Duplicate entries and insufficient balances are NOT errors here: both are
//! expected reconciliation outcomes and are reported through the outcome
//! structs so callers cannot confuse them with store faults.

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

    /// A refund was requested for a job with no recorded spend.
    #[error("no spend recorded for job {job_id}")]
    SpendNotFound {
        /// The generation job id.
        job_id: String,
    },
}
