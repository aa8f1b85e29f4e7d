use crate::types::{ObjectPath, StoreError};
use thiserror::Error;

/// Error type for audit runs.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The starting path does not resolve to an object.
    #[error("invalid path: {0}")]
    InvalidPath(ObjectPath),
    /// Fatal store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// I/O error while writing a report.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for audit runs.
pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
    pub(crate) fn from_resolve(err: StoreError) -> Self {
        match err {
            StoreError::PathNotFound(path) => AuditError::InvalidPath(path),
            other => AuditError::Store(other),
        }
    }
}
