//! Admission pipeline error types

use hylo_core::CoreError;
use hylo_patch::PatchError;
use hylo_store::StoreError;
use thiserror::Error;

use crate::review::ReviewError;

/// Result type for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Errors raised by the admission pipeline
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdmissionError {
    /// One or more webhooks rejected the command; carries every collected
    /// error, not just the first
    #[error("admission rejected with {count} error(s)", count = .errors.len())]
    Rejected { errors: Vec<ReviewError> },

    /// A webhook resource is malformed
    #[error("invalid webhook '{name}': {reason}")]
    InvalidWebhook { name: String, reason: String },

    /// Definition lookup or validation failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Patch application failure
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Repository failure after the gate
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdmissionError {
    /// Check if this is a webhook rejection
    pub fn is_rejected(&self) -> bool {
        matches!(self, AdmissionError::Rejected { .. })
    }

    /// The collected webhook errors, when rejected
    pub fn review_errors(&self) -> &[ReviewError] {
        match self {
            AdmissionError::Rejected { errors } => errors,
            _ => &[],
        }
    }
}
