//! Error types for coursepay storage.

use coursepay_core::{ConflictError, IntegrityError, ValidationError};

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

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity type that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// A re-check inside an atomic commit failed (e.g. wallet balance
    /// shrank between validation and commit).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Lost a concurrent conditional transition.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// An accounting invariant was violated.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl From<coursepay_core::SettleError> for StoreError {
    fn from(err: coursepay_core::SettleError) -> Self {
        match err {
            coursepay_core::SettleError::Conflict(e) => Self::Conflict(e),
            coursepay_core::SettleError::Integrity(e) => Self::Integrity(e),
        }
    }
}
