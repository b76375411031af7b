//! List queries, deterministic pagination and continuation tokens
//!
//! Results are ordered by name; the continuation token opaquely encodes the
//! last returned name so a follow-up query resumes strictly after it with
//! no overlap and no omission.

use hylo_core::{LabelSelector, Resource};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Parameters of a list operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Collection group
    pub group: String,

    /// Collection version
    pub version: String,

    /// Collection plural name
    pub plural: String,

    /// Restrict to one namespace; `None` spans all of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Every selector must hold for a resource to be returned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<LabelSelector>,

    /// Page size; clamped to the backend maximum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,

    /// Opaque resume position from a previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

impl ListQuery {
    /// Query over a whole collection
    pub fn collection(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: None,
            selectors: Vec::new(),
            max_results: None,
            continuation: None,
        }
    }

    /// Restrict to a namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a label selector
    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Cap the page size
    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Resume after a previous page's continuation token
    pub fn after(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }
}

/// One page of list results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Matching resources, ordered by name
    pub items: Vec<Resource>,

    /// Token for the next page; absent on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

impl Page {
    /// Whether this is the final page
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

pub(crate) fn encode_token(last_name: &str) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, last_name)
}

pub(crate) fn decode_token(token: &str) -> Result<String> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, token)
        .map_err(|_| StoreError::InvalidContinuation)?;
    String::from_utf8(decoded).map_err(|_| StoreError::InvalidContinuation)
}

/// Order a filtered snapshot by name and cut the requested page
pub(crate) fn paginate(
    mut items: Vec<Resource>,
    query: &ListQuery,
    max_page_size: usize,
) -> Result<Page> {
    items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    if let Some(token) = &query.continuation {
        let resume_after = decode_token(token)?;
        items.retain(|r| r.metadata.name > resume_after);
    }

    let limit = query
        .max_results
        .unwrap_or(max_page_size)
        .min(max_page_size)
        .max(1);

    let continuation = if items.len() > limit {
        items.truncate(limit);
        items.last().map(|r| encode_token(&r.metadata.name))
    } else {
        None
    };

    Ok(Page {
        items,
        continuation,
    })
}
