//! The resource repository contract and its reference backends
//!
//! Backends implement [`ResourceStore`] verbatim:
//! - **Memory**: in-process map, the test double and single-node default
//! - **File**: one resource per file, for development and durable local runs
//!
//! All backends share the same semantics: optimistic concurrency through
//! `resourceVersion`, definition resolution before every operation, schema
//! validation on writes, name-ordered pagination and watch events on every
//! non-dry-run mutation. Logical conflicts are never retried; transient I/O
//! is retried with bounded backoff and surfaced as `Unavailable` when
//! exhausted.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;

use hylo_core::{validate_spec, Resource, ResourceDefinition, ResourceReference};
use hylo_patch::{MergeKeys, Patch};

use crate::error::{Result, StoreError};
use crate::events::{EventKind, ResourceWatchEvent, WatchFilter, WatchStream};
use crate::query::{ListQuery, Page};

/// Storage-agnostic repository every backend implements
///
/// Implementations must be Send + Sync for use across async tasks.
/// Cancellation is drop-based: abandoning a returned future stops the
/// operation at its next await point.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create a resource; assigns `creationTimestamp` and the initial
    /// `resourceVersion`, emits `Created` unless `dry_run`
    async fn add(&self, resource: Resource, dry_run: bool) -> Result<Resource>;

    /// Replace a resource; the supplied `resourceVersion` must match the
    /// stored one, emits `Updated` unless `dry_run`
    async fn replace(&self, resource: Resource, dry_run: bool) -> Result<Resource>;

    /// Load, apply a patch and replace in one step
    async fn patch(&self, reference: &ResourceReference, patch: Patch, dry_run: bool)
        -> Result<Resource>;

    /// Delete a resource, returning the pre-deletion snapshot; emits
    /// `Deleted` unless `dry_run`
    async fn remove(&self, reference: &ResourceReference, dry_run: bool) -> Result<Resource>;

    /// Fetch a single resource
    async fn get(&self, reference: &ResourceReference) -> Result<Resource>;

    /// List matching resources, ordered by name with opaque continuation
    async fn list(&self, query: &ListQuery) -> Result<Page>;

    /// Subscribe to change events matching a filter
    fn watch(&self, filter: WatchFilter) -> WatchStream;
}

/// Backend tuning knobs
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Hard cap on list page sizes; larger requests are clamped
    pub max_page_size: usize,

    /// Retry policy for transient backend I/O
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_page_size() -> usize {
    500
}

/// Bounded backoff for transient I/O failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts before giving up
    pub attempts: u32,

    /// Delay before the first retry; doubles each attempt
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Run a fallible I/O operation under the retry policy
///
/// Logical outcomes never pass through here; only genuinely transient
/// failures are worth repeating.
pub(crate) async fn with_retry<T, F>(retry: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> std::io::Result<T>,
{
    let mut delay = retry.base_delay;
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= retry.attempts {
                    return Err(StoreError::Unavailable(format!("{}: {}", what, e)));
                }
                tracing::warn!(error = %e, attempt, "{} failed, retrying", what);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Check a resource against the definition of the collection it is written to
pub(crate) fn check_against_definition(
    definition: &ResourceDefinition,
    resource: &Resource,
) -> Result<()> {
    if resource.kind != definition.kind || resource.group() != definition.group {
        return Err(StoreError::Core(hylo_core::CoreError::DefinitionMismatch(
            format!(
                "resource {}/{} does not belong to definition {}/{}",
                resource.group(),
                resource.kind,
                definition.group,
                definition.kind
            ),
        )));
    }
    let version = definition.served_version(resource.version())?;
    resource.metadata.validate(definition.scope)?;
    validate_spec(&version.schema, &resource.metadata.name, &resource.spec)?;
    Ok(())
}

/// The reference a stored resource is addressed by
pub(crate) fn reference_for(definition: &ResourceDefinition, resource: &Resource) -> ResourceReference {
    ResourceReference {
        group: definition.group.clone(),
        version: resource.version().to_string(),
        plural: definition.plural_name.clone(),
        namespace: resource.metadata.namespace.clone(),
        name: resource.metadata.name.clone(),
    }
}

/// Apply a patch to a loaded resource, preserving its identity and version
///
/// The result carries the loaded `resourceVersion`, so the follow-up
/// replace fails with a conflict if a concurrent write landed in between.
pub fn patched_resource(
    definition: &ResourceDefinition,
    current: &Resource,
    patch: &Patch,
) -> Result<Resource> {
    let empty = MergeKeys::new();
    let merge_keys = definition
        .version(current.version())
        .map(|v| &v.merge_keys)
        .unwrap_or(&empty);

    let document = current.to_value()?;
    let patched = patch.apply_to(&document, merge_keys)?;
    let mut updated = Resource::from_value(patched)?;

    if updated.metadata.name != current.metadata.name
        || updated.metadata.namespace != current.metadata.namespace
        || updated.kind != current.kind
        || updated.api_version != current.api_version
    {
        return Err(StoreError::Core(hylo_core::CoreError::DefinitionMismatch(
            "a patch may not change the resource identity".to_string(),
        )));
    }
    updated.metadata.resource_version = current.metadata.resource_version.clone();
    updated.metadata.creation_timestamp = current.metadata.creation_timestamp;
    Ok(updated)
}

pub(crate) fn event(
    kind: EventKind,
    definition: &ResourceDefinition,
    resource: &Resource,
) -> ResourceWatchEvent {
    ResourceWatchEvent {
        kind,
        reference: reference_for(definition, resource),
        resource: resource.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_failures() {
        let failures = AtomicU32::new(2);
        let retry = RetryConfig {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        };

        let value = with_retry(&retry, "flaky op", || {
            if failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(std::io::Error::other("transient"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_retry_exhaustion_is_unavailable() {
        let retry = RetryConfig {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        };

        let result: Result<()> = with_retry(&retry, "doomed op", || {
            Err(std::io::Error::other("still broken"))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
