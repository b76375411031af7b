//! HTTP invocation of webhook endpoints
//!
//! Endpoints receive `POST {id, operation, resource}` and answer
//! `{id, succeeded, patch?, errors?}`. The timeout lives on the HTTP
//! client; a slow endpoint turns into a transport error, which the
//! pipeline folds into a failed review.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::review::{AdmissionRequest, AdmissionResponse};

/// Default timeout for one webhook call
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport-level webhook failure
///
/// Never surfaced to callers directly; the pipeline converts it into a
/// synthetic failed review (admission fails closed).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The endpoint URI is not a valid URL
    #[error("invalid webhook uri '{0}'")]
    Uri(String),

    /// Connection, TLS or timeout failure
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered outside 2xx
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Delivers admission requests to webhook endpoints
#[async_trait]
pub trait WebhookInvoker: Send + Sync {
    /// POST the request to `uri` and parse the response
    async fn review(
        &self,
        uri: &str,
        request: &AdmissionRequest,
    ) -> std::result::Result<AdmissionResponse, InvokeError>;
}

/// reqwest-backed invoker
pub struct HttpWebhookInvoker {
    client: reqwest::Client,
}

impl HttpWebhookInvoker {
    /// An invoker with the default timeout
    pub fn new() -> std::result::Result<Self, InvokeError> {
        Self::with_timeout(DEFAULT_WEBHOOK_TIMEOUT)
    }

    /// An invoker with an explicit per-call timeout
    pub fn with_timeout(timeout: Duration) -> std::result::Result<Self, InvokeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookInvoker for HttpWebhookInvoker {
    async fn review(
        &self,
        uri: &str,
        request: &AdmissionRequest,
    ) -> std::result::Result<AdmissionResponse, InvokeError> {
        let url = Url::parse(uri).map_err(|_| InvokeError::Uri(uri.to_string()))?;
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::Status(status.as_u16()));
        }
        Ok(response.json::<AdmissionResponse>().await?)
    }
}
