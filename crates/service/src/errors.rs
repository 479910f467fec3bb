use models::{ETag, ModelError};
use thiserror::Error;

/// Failures surfaced by the table, queue and file share clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    /// The stored version moved on since the caller read it; refresh and retry.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: String, actual: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{what} not found")) }

    pub fn version_conflict(expected: &ETag, actual: &ETag) -> Self {
        Self::VersionConflict { expected: expected.to_string(), actual: actual.to_string() }
    }

    pub fn io(context: &str, e: impl std::fmt::Display) -> Self { Self::Unavailable(format!("{context}: {e}")) }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            StorageError::NotFound(_) => 2001,
            StorageError::Conflict(_) => 2002,
            StorageError::VersionConflict { .. } => 2003,
            StorageError::InvalidArgument(_) => 2004,
            StorageError::Unavailable(_) => 2101,
            StorageError::Serialization(_) => 2102,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool { matches!(self, StorageError::Unavailable(_)) }
}

impl From<ModelError> for StorageError {
    fn from(e: ModelError) -> Self { Self::InvalidArgument(e.to_string()) }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}
