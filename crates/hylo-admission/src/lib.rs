//! Hylo Admission - the webhook gate in front of repository writes
//!
//! This crate provides:
//! - **Rule Matching**: regex-based selection of webhooks per resource and
//!   operation
//! - **Webhook Model**: mutating/validating webhooks parsed from their
//!   stored resource form, ordered by priority with stable registration
//!   tie-break
//! - **Review Exchange**: the `{id, operation, resource}` /
//!   `{id, succeeded, patch?, errors?}` wire contract and the per-attempt
//!   `ReviewContext`
//! - **HTTP Invocation**: a reqwest-backed invoker with per-call timeout;
//!   transport failures become failed reviews (the gate fails closed)
//! - **Pipeline**: resolve definition, invoke mutating then validating
//!   webhooks, aggregate every error, forward to the store only on full
//!   success

pub mod client;
pub mod error;
pub mod pipeline;
pub mod review;
pub mod rules;
pub mod webhook;

pub use client::{HttpWebhookInvoker, InvokeError, WebhookInvoker, DEFAULT_WEBHOOK_TIMEOUT};
pub use error::{AdmissionError, Result};
pub use pipeline::AdmissionPipeline;
pub use review::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, ReviewContext, ReviewError,
};
pub use rules::{Operation, RuleCandidate, RuleWithOperation};
pub use webhook::{Webhook, WebhookClientConfig, WebhookKind, WebhookRegistry};
