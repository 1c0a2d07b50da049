//! Quest engine errors.

use crate::storage::store::StoreError;

/// Errors returned by quest operations.
///
/// All of these are local to one operation; the caller can retry with
/// corrected input, or unchanged input for [`QuestError::Transient`].
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too far from token: {distance:.1} m away, radius is {radius:.1} m")]
    OutOfRange { distance: f64, radius: f64 },

    #[error("Invalid scan: {0}")]
    InvalidScan(String),

    #[error("Storage busy, gave up after {attempts} attempts")]
    Transient { attempts: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl QuestError {
    /// Whether reissuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuestError::Transient { .. })
    }
}

impl From<StoreError> for QuestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RetriesExhausted { attempts } => QuestError::Transient { attempts },
            other => QuestError::Storage(other),
        }
    }
}
