//! Admission review exchange and per-attempt context
//!
//! One `AdmissionReview` records a single webhook call: the request that
//! went out and the response (or synthetic failure) that came back. A
//! `ReviewContext` accumulates every review of one logical admission
//! attempt and is discarded once the command resolves; it is never
//! persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use hylo_core::Resource;

use crate::rules::Operation;

/// Structured error reported by a webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewError {
    /// Field the error refers to, e.g. `spec.x`; empty for whole-resource
    #[serde(default)]
    pub field: String,

    /// Human-readable message
    pub message: String,
}

impl ReviewError {
    /// An error tied to a field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// A whole-resource error
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            field: String::new(),
            message: message.into(),
        }
    }
}

/// Request delivered to a webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Fresh id per attempt, echoed by the response
    pub id: String,

    /// The operation under review
    pub operation: Operation,

    /// Snapshot of the resource at this pipeline step
    pub resource: Resource,
}

/// Response returned by a webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Echo of the request id
    #[serde(default)]
    pub id: String,

    /// The webhook's verdict
    pub succeeded: bool,

    /// Optional JSON Patch document (mutating webhooks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<JsonValue>,

    /// Errors explaining a rejection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ReviewError>,
}

impl AdmissionResponse {
    /// A plain approval
    pub fn allowed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            succeeded: true,
            patch: None,
            errors: Vec::new(),
        }
    }

    /// An approval carrying a mutation
    pub fn allowed_with_patch(id: impl Into<String>, patch: JsonValue) -> Self {
        Self {
            id: id.into(),
            succeeded: true,
            patch: Some(patch),
            errors: Vec::new(),
        }
    }

    /// A rejection with its reasons
    pub fn rejected(id: impl Into<String>, errors: Vec<ReviewError>) -> Self {
        Self {
            id: id.into(),
            succeeded: false,
            patch: None,
            errors,
        }
    }

    /// Synthetic failed review for an unreachable or misbehaving endpoint
    ///
    /// Admission is a synchronous gate and fails closed; transport errors
    /// become rejections, never retries.
    pub fn unreachable(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            succeeded: false,
            patch: None,
            errors: vec![ReviewError::message(format!(
                "webhook unreachable: {}",
                reason.into()
            ))],
        }
    }
}

/// One webhook call of an admission attempt
#[derive(Debug, Clone)]
pub struct AdmissionReview {
    /// Name of the webhook that was called
    pub webhook: String,

    /// What was sent
    pub request: AdmissionRequest,

    /// What came back (possibly synthetic)
    pub response: AdmissionResponse,
}

/// Accumulates every review performed for one admission attempt
#[derive(Debug, Default)]
pub struct ReviewContext {
    reviews: Vec<AdmissionReview>,
}

impl ReviewContext {
    /// An empty context for a fresh attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed review
    pub fn push(&mut self, review: AdmissionReview) {
        self.reviews.push(review);
    }

    /// AND over every response; true when no webhooks applied
    pub fn succeeded(&self) -> bool {
        self.reviews.iter().all(|review| review.response.succeeded)
    }

    /// Every error collected across failed reviews
    pub fn errors(&self) -> Vec<ReviewError> {
        self.reviews
            .iter()
            .filter(|review| !review.response.succeeded)
            .flat_map(|review| review.response.errors.iter().cloned())
            .collect()
    }

    /// The recorded reviews, in invocation order
    pub fn reviews(&self) -> &[AdmissionReview] {
        &self.reviews
    }
}

/// Fresh random id for one review attempt
pub(crate) fn review_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}
