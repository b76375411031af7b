//! Error types for the resource repository

use hylo_core::CoreError;
use hylo_patch::PatchError;
use thiserror::Error;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during repository operations
///
/// Logical conflicts (`AlreadyExists`, `VersionConflict`, `NotFound`) are
/// returned immediately and never retried; `Unavailable` is raised only
/// after the backend has exhausted its bounded retries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A resource with the same coordinates is already stored
    #[error("resource '{name}' already exists in collection '{plural}'")]
    AlreadyExists {
        plural: String,
        namespace: Option<String>,
        name: String,
    },

    /// No resource at the given coordinates
    #[error("resource '{name}' not found in collection '{plural}'")]
    NotFound {
        plural: String,
        namespace: Option<String>,
        name: String,
    },

    /// Optimistic concurrency failure; carries the version currently stored
    /// so the caller can re-read and retry
    #[error("version conflict on '{name}': expected {expected}, current {current}")]
    VersionConflict {
        name: String,
        expected: String,
        current: String,
    },

    /// Replace was called without a resourceVersion to compare
    #[error("resource '{name}' carries no resourceVersion to compare")]
    MissingVersion { name: String },

    /// Backend I/O kept failing after bounded retries
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Malformed continuation token
    #[error("invalid continuation token")]
    InvalidContinuation,

    /// Validation or definition lookup failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Patch application failure
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Stored document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Non-retried I/O failure (backend setup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl StoreError {
    /// Check if this is a missing-resource error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if this is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Check if this is a duplicate-create error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}
