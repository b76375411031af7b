//! File-based store
//!
//! One resource per file, path-addressed by
//! `<base>/<group>/<version>/<plural>/<namespace>/<name>.json` (cluster
//! scope uses a fixed `_cluster` segment). The stored document carries its
//! `resourceVersion`, which is what conflict checks compare against. Useful
//! for development, offline runs and durable single-node setups.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hylo_core::{matches_all, Registry, Resource, ResourceReference};
use hylo_patch::Patch;

use super::{
    check_against_definition, event, patched_resource, with_retry, ResourceStore, StoreConfig,
};
use crate::error::{Result, StoreError};
use crate::events::{EventHub, EventKind, WatchFilter, WatchStream};
use crate::query::{paginate, ListQuery, Page};
use crate::version;

/// Directory segment standing in for "no namespace"
const CLUSTER_SEGMENT: &str = "_cluster";

/// File-backed repository backend
pub struct FileStore {
    registry: Arc<Registry>,
    events: Arc<EventHub>,
    config: StoreConfig,
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating it if needed
    pub fn new(base_dir: PathBuf, registry: Arc<Registry>, events: Arc<EventHub>) -> Result<Self> {
        Self::with_config(base_dir, registry, events, StoreConfig::default())
    }

    /// Create a store with explicit tuning
    pub fn with_config(
        base_dir: PathBuf,
        registry: Arc<Registry>,
        events: Arc<EventHub>,
        config: StoreConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            registry,
            events,
            config,
            base_dir,
        })
    }

    fn namespace_dir(&self, reference: &ResourceReference) -> PathBuf {
        self.base_dir
            .join(&reference.group)
            .join(&reference.version)
            .join(&reference.plural)
            .join(
                reference
                    .namespace
                    .as_deref()
                    .unwrap_or(CLUSTER_SEGMENT),
            )
    }

    fn resource_path(&self, reference: &ResourceReference) -> PathBuf {
        self.namespace_dir(reference)
            .join(format!("{}.json", reference.name))
    }

    async fn read_resource(&self, path: &Path) -> Result<Resource> {
        let data = with_retry(&self.config.retry, "read resource file", || {
            std::fs::read(path)
        })
        .await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn write_resource(&self, path: &Path, resource: &Resource) -> Result<()> {
        if let Some(parent) = path.parent() {
            with_retry(&self.config.retry, "create collection directory", || {
                std::fs::create_dir_all(parent)
            })
            .await?;
        }
        let data = serde_json::to_vec_pretty(resource)?;
        with_retry(&self.config.retry, "write resource file", || {
            std::fs::write(path, &data)
        })
        .await
    }

    fn not_found(reference: &ResourceReference) -> StoreError {
        StoreError::NotFound {
            plural: reference.plural.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        }
    }

    fn namespace_dirs(&self, query: &ListQuery) -> Vec<PathBuf> {
        let collection_dir = self
            .base_dir
            .join(&query.group)
            .join(&query.version)
            .join(&query.plural);

        if let Some(namespace) = &query.namespace {
            let dir = collection_dir.join(namespace);
            return if dir.is_dir() { vec![dir] } else { Vec::new() };
        }

        let Ok(entries) = std::fs::read_dir(&collection_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect()
    }
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn add(&self, resource: Resource, dry_run: bool) -> Result<Resource> {
        let definition = self
            .registry
            .definition_for_kind(resource.group(), &resource.kind)?;
        check_against_definition(&definition, &resource)?;

        let reference = super::reference_for(&definition, &resource);
        let path = self.resource_path(&reference);
        if path.exists() {
            return Err(StoreError::AlreadyExists {
                plural: reference.plural,
                namespace: reference.namespace,
                name: reference.name,
            });
        }

        let mut stored = resource;
        stored.metadata.creation_timestamp = Some(Utc::now());
        stored.metadata.resource_version = Some(version::initial());

        if !dry_run {
            self.write_resource(&path, &stored).await?;
            self.events
                .publish(event(EventKind::Created, &definition, &stored));
        }
        Ok(stored)
    }

    async fn replace(&self, resource: Resource, dry_run: bool) -> Result<Resource> {
        let definition = self
            .registry
            .definition_for_kind(resource.group(), &resource.kind)?;
        check_against_definition(&definition, &resource)?;

        let reference = super::reference_for(&definition, &resource);
        let path = self.resource_path(&reference);
        if !path.exists() {
            return Err(Self::not_found(&reference));
        }
        let current = self.read_resource(&path).await?;

        let current_version = current
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or(version::INITIAL_VERSION);
        version::check(
            resource.metadata.resource_version.as_deref(),
            current_version,
            &resource.metadata.name,
        )?;

        let mut stored = resource;
        stored.metadata.creation_timestamp = current.metadata.creation_timestamp;
        stored.metadata.resource_version = Some(version::next(current_version));

        if !dry_run {
            self.write_resource(&path, &stored).await?;
            self.events
                .publish(event(EventKind::Updated, &definition, &stored));
        }
        Ok(stored)
    }

    async fn patch(
        &self,
        reference: &ResourceReference,
        patch: Patch,
        dry_run: bool,
    ) -> Result<Resource> {
        let definition = self.registry.resolve(reference)?;
        let current = self.get(reference).await?;
        let updated = patched_resource(&definition, &current, &patch)?;
        self.replace(updated, dry_run).await
    }

    async fn remove(&self, reference: &ResourceReference, dry_run: bool) -> Result<Resource> {
        let definition = self.registry.resolve(reference)?;
        let path = self.resource_path(reference);
        if !path.exists() {
            return Err(Self::not_found(reference));
        }
        let snapshot = self.read_resource(&path).await?;

        if !dry_run {
            with_retry(&self.config.retry, "remove resource file", || {
                std::fs::remove_file(&path)
            })
            .await?;

            // Prune now-empty namespace directories
            let namespace_dir = self.namespace_dir(reference);
            if namespace_dir.is_dir()
                && std::fs::read_dir(&namespace_dir)
                    .map(|mut entries| entries.next().is_none())
                    .unwrap_or(false)
            {
                let _ = std::fs::remove_dir(&namespace_dir);
            }

            self.events
                .publish(event(EventKind::Deleted, &definition, &snapshot));
        }
        Ok(snapshot)
    }

    async fn get(&self, reference: &ResourceReference) -> Result<Resource> {
        self.registry.resolve(reference)?;
        let path = self.resource_path(reference);
        if !path.exists() {
            return Err(Self::not_found(reference));
        }
        self.read_resource(&path).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        self.registry
            .definition(&query.group, &query.version, &query.plural)?;

        let mut items = Vec::new();
        for dir in self.namespace_dirs(query) {
            let entries = with_retry(&self.config.retry, "read collection directory", || {
                std::fs::read_dir(&dir).map(|entries| {
                    entries
                        .filter_map(|entry| entry.ok())
                        .map(|entry| entry.path())
                        .filter(|path| {
                            path.extension().map(|ext| ext == "json").unwrap_or(false)
                        })
                        .collect::<Vec<PathBuf>>()
                })
            })
            .await?;

            for path in entries {
                let resource = self.read_resource(&path).await?;
                if matches_all(&query.selectors, &resource.metadata.labels) {
                    items.push(resource);
                }
            }
        }

        paginate(items, query, self.config.max_page_size)
    }

    fn watch(&self, filter: WatchFilter) -> WatchStream {
        self.events.watch(filter)
    }
}
