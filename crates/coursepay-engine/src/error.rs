//! Engine error type.

use coursepay_core::{ConflictError, IntegrityError, ValidationError};
use coursepay_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the payment and settlement services.
///
/// The core taxonomy (validation / conflict / integrity) is preserved even
/// when a failure originates inside the storage layer, so callers can map
/// each family to a response without digging through wrappers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request is invalid; the caller can fix it.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Lost a concurrent transition; re-read before retrying.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// An accounting invariant was violated. Fatal.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The storage layer failed for a non-domain reason.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// The external payment gateway declined, failed, or timed out.
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => Self::Validation(e),
            StoreError::Conflict(e) => Self::Conflict(e),
            StoreError::Integrity(e) => Self::Integrity(e),
            other => Self::Store(other),
        }
    }
}
