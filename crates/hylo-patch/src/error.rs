//! Patch engine error types

use thiserror::Error;

/// Result type for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;

/// Errors that can occur while computing or applying patches
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatchError {
    /// A `test` operation's expected value did not match the document
    #[error("patch conflict: test at '{path}' failed")]
    TestFailed { path: String },

    /// A referenced path does not exist in the target tree
    #[error("path '{path}' not found in target document")]
    PathNotFound { path: String },

    /// A pointer is not a valid RFC 6901 JSON Pointer
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),

    /// The patch document itself is malformed
    #[error("invalid patch document: {0}")]
    InvalidPatch(String),
}

impl PatchError {
    /// Check if this is a test-mismatch conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, PatchError::TestFailed { .. })
    }
}
