//! In-memory store
//!
//! The reference implementation of the repository contract: a map behind a
//! read/write lock. Backs unit tests and single-node setups where
//! durability is not required.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use hylo_core::{matches_all, Registry, Resource, ResourceReference};
use hylo_patch::Patch;

use super::{
    check_against_definition, event, patched_resource, ResourceStore, StoreConfig,
};
use crate::error::{Result, StoreError};
use crate::events::{EventHub, EventKind, WatchFilter, WatchStream};
use crate::query::{paginate, ListQuery, Page};
use crate::version;

/// Collection coordinates resources are grouped under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CollectionKey {
    group: String,
    version: String,
    plural: String,
}

/// (namespace, name) within a collection
type ItemKey = (Option<String>, String);

type Collections = HashMap<CollectionKey, BTreeMap<ItemKey, Resource>>;

/// In-memory repository backend
pub struct MemoryStore {
    registry: Arc<Registry>,
    events: Arc<EventHub>,
    config: StoreConfig,
    collections: RwLock<Collections>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(registry: Arc<Registry>, events: Arc<EventHub>) -> Self {
        Self::with_config(registry, events, StoreConfig::default())
    }

    /// Create an empty store with explicit tuning
    pub fn with_config(registry: Arc<Registry>, events: Arc<EventHub>, config: StoreConfig) -> Self {
        Self {
            registry,
            events,
            config,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored resources across all collections
    pub fn resource_count(&self) -> usize {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections.values().map(BTreeMap::len).sum()
    }

    fn collection_key(reference: &ResourceReference) -> CollectionKey {
        CollectionKey {
            group: reference.group.clone(),
            version: reference.version.clone(),
            plural: reference.plural.clone(),
        }
    }

    fn not_found(reference: &ResourceReference) -> StoreError {
        StoreError::NotFound {
            plural: reference.plural.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn add(&self, resource: Resource, dry_run: bool) -> Result<Resource> {
        let definition = self
            .registry
            .definition_for_kind(resource.group(), &resource.kind)?;
        check_against_definition(&definition, &resource)?;

        let reference = super::reference_for(&definition, &resource);
        let key = Self::collection_key(&reference);
        let item_key = (
            resource.metadata.namespace.clone(),
            resource.metadata.name.clone(),
        );

        let mut stored = resource;
        stored.metadata.creation_timestamp = Some(Utc::now());
        stored.metadata.resource_version = Some(version::initial());

        {
            let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let collection = collections.entry(key).or_default();
            if collection.contains_key(&item_key) {
                return Err(StoreError::AlreadyExists {
                    plural: reference.plural,
                    namespace: item_key.0,
                    name: item_key.1,
                });
            }
            if !dry_run {
                collection.insert(item_key, stored.clone());
            }
        }

        if !dry_run {
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
        let key = Self::collection_key(&reference);
        let item_key = (
            resource.metadata.namespace.clone(),
            resource.metadata.name.clone(),
        );

        let stored = {
            let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let collection = collections
                .get_mut(&key)
                .ok_or_else(|| Self::not_found(&reference))?;
            let current = collection
                .get(&item_key)
                .ok_or_else(|| Self::not_found(&reference))?;

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
                collection.insert(item_key, stored.clone());
            }
            stored
        };

        if !dry_run {
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
        let key = Self::collection_key(reference);
        let item_key = (reference.namespace.clone(), reference.name.clone());

        let snapshot = {
            let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let collection = collections
                .get_mut(&key)
                .ok_or_else(|| Self::not_found(reference))?;
            let snapshot = collection
                .get(&item_key)
                .cloned()
                .ok_or_else(|| Self::not_found(reference))?;
            if !dry_run {
                collection.remove(&item_key);
            }
            snapshot
        };

        if !dry_run {
            self.events
                .publish(event(EventKind::Deleted, &definition, &snapshot));
        }
        Ok(snapshot)
    }

    async fn get(&self, reference: &ResourceReference) -> Result<Resource> {
        self.registry.resolve(reference)?;
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections
            .get(&Self::collection_key(reference))
            .and_then(|collection| {
                collection.get(&(reference.namespace.clone(), reference.name.clone()))
            })
            .cloned()
            .ok_or_else(|| Self::not_found(reference))
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        self.registry
            .definition(&query.group, &query.version, &query.plural)?;

        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let key = CollectionKey {
            group: query.group.clone(),
            version: query.version.clone(),
            plural: query.plural.clone(),
        };
        let items: Vec<Resource> = collections
            .get(&key)
            .map(|collection| {
                collection
                    .values()
                    .filter(|resource| {
                        query
                            .namespace
                            .as_ref()
                            .is_none_or(|ns| resource.metadata.namespace.as_ref() == Some(ns))
                    })
                    .filter(|resource| {
                        matches_all(&query.selectors, &resource.metadata.labels)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        paginate(items, query, self.config.max_page_size)
    }

    fn watch(&self, filter: WatchFilter) -> WatchStream {
        self.events.watch(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use futures::StreamExt;
    use hylo_core::{
        DefinitionVersion, LabelSelector, ResourceDefinition, ResourceMetadata, ResourceScope,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn widget_definition() -> ResourceDefinition {
        ResourceDefinition {
            scope: ResourceScope::Namespaced,
            group: "test.hylo.cloud".to_string(),
            kind: "Widget".to_string(),
            singular_name: "widget".to_string(),
            plural_name: "widgets".to_string(),
            short_names: Vec::new(),
            versions: vec![DefinitionVersion {
                name: "v1".to_string(),
                served: true,
                storage: true,
                schema: json!({
                    "type": "object",
                    "properties": { "size": { "type": "integer", "minimum": 0 } }
                }),
                merge_keys: BTreeMap::new(),
            }],
        }
    }

    async fn test_store() -> MemoryStore {
        let registry = Arc::new(Registry::new());
        registry.register(widget_definition()).unwrap();
        let events = EventHub::start("test-replica", Arc::new(InProcessBus::new())).await;
        MemoryStore::new(registry, events)
    }

    fn widget(name: &str, namespace: &str, size: u32) -> Resource {
        Resource {
            api_version: "test.hylo.cloud/v1".to_string(),
            kind: "Widget".to_string(),
            metadata: ResourceMetadata::namespaced(name, namespace),
            spec: json!({"size": size}),
            status: None,
        }
    }

    fn widget_ref(namespace: &str, name: &str) -> ResourceReference {
        ResourceReference::namespaced("test.hylo.cloud", "v1", "widgets", namespace, name)
    }

    #[tokio::test]
    async fn test_add_assigns_version_and_timestamp() {
        let store = test_store().await;

        let stored = store.add(widget("w-1", "ns-a", 3), false).await.unwrap();
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("1"));
        assert!(stored.metadata.creation_timestamp.is_some());

        let fetched = store.get(&widget_ref("ns-a", "w-1")).await.unwrap();
        assert_eq!(fetched.spec["size"], 3);
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let result = store.add(widget("w-1", "ns-a", 4), false).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_add_unknown_kind_is_terminal() {
        let store = test_store().await;
        let mut resource = widget("w-1", "ns-a", 3);
        resource.kind = "Gadget".to_string();

        let result = store.add(resource, false).await;
        match result {
            Err(StoreError::Core(e)) => assert!(e.is_definition_not_found()),
            other => panic!("expected definition lookup failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_validates_schema() {
        let store = test_store().await;
        let mut resource = widget("w-1", "ns-a", 0);
        resource.spec = json!({"size": -5});

        let result = store.add(resource, false).await;
        match result {
            Err(StoreError::Core(e)) => assert!(e.is_validation()),
            other => panic!("expected schema violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dry_run_add_does_not_persist() {
        let store = test_store().await;

        let previewed = store.add(widget("w-1", "ns-a", 3), true).await.unwrap();
        assert_eq!(previewed.metadata.resource_version.as_deref(), Some("1"));

        assert_eq!(store.resource_count(), 0);
        let result = store.get(&widget_ref("ns-a", "w-1")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_replace_bumps_version() {
        let store = test_store().await;
        let stored = store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let mut updated = stored.clone();
        updated.spec = json!({"size": 4});
        let replaced = store.replace(updated, false).await.unwrap();

        assert_eq!(replaced.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(
            replaced.metadata.creation_timestamp,
            stored.metadata.creation_timestamp
        );
    }

    #[tokio::test]
    async fn test_replace_requires_matching_version() {
        let store = test_store().await;
        let stored = store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let mut first = stored.clone();
        first.spec = json!({"size": 4});
        store.replace(first, false).await.unwrap();

        // Still carries version "1"
        let mut stale = stored;
        stale.spec = json!({"size": 5});
        let result = store.replace(stale, false).await;
        match result {
            Err(StoreError::VersionConflict { current, .. }) => assert_eq!(current, "2"),
            other => panic!("expected VersionConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_replaces_have_exactly_one_winner() {
        let store = Arc::new(test_store().await);
        let stored = store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let mut left = stored.clone();
        left.spec = json!({"size": 10});
        let mut right = stored;
        right.spec = json!({"size": 20});

        let (left_result, right_result) =
            tokio::join!(store.replace(left, false), store.replace(right, false));

        let winners = [&left_result, &right_result]
            .iter()
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(winners, 1, "exactly one concurrent replace must win");

        let loser = if left_result.is_ok() {
            right_result
        } else {
            left_result
        };
        assert!(matches!(loser, Err(StoreError::VersionConflict { .. })));

        let current = store.get(&widget_ref("ns-a", "w-1")).await.unwrap();
        assert_eq!(current.metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_patch_applies_and_bumps() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let patch = Patch::merge(json!({"spec": {"size": 9}}));
        let patched = store
            .patch(&widget_ref("ns-a", "w-1"), patch, false)
            .await
            .unwrap();

        assert_eq!(patched.spec["size"], 9);
        assert_eq!(patched.metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_patch_may_not_rename() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let patch = Patch::merge(json!({"metadata": {"name": "w-2"}}));
        let result = store.patch(&widget_ref("ns-a", "w-1"), patch, false).await;
        assert!(matches!(
            result,
            Err(StoreError::Core(hylo_core::CoreError::DefinitionMismatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_remove_returns_snapshot() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        let snapshot = store
            .remove(&widget_ref("ns-a", "w-1"), false)
            .await
            .unwrap();
        assert_eq!(snapshot.metadata.name, "w-1");

        let result = store.get(&widget_ref("ns-a", "w-1")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_missing_fails() {
        let store = test_store().await;
        let result = store.remove(&widget_ref("ns-a", "ghost"), false).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_dry_run_remove_keeps_resource() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();

        store.remove(&widget_ref("ns-a", "w-1"), true).await.unwrap();
        assert!(store.get(&widget_ref("ns-a", "w-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_with_selector_and_pagination() {
        let store = test_store().await;
        for i in 0..10 {
            let mut resource = widget(&format!("w-{:02}", i), "ns-a", i);
            if i < 3 {
                resource
                    .metadata
                    .labels
                    .insert("tier".to_string(), "frontend".to_string());
            }
            store.add(resource, false).await.unwrap();
        }

        let query = ListQuery::collection("test.hylo.cloud", "v1", "widgets")
            .with_selector(LabelSelector::equals("tier", "frontend"));
        let page = store.list(&query).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.is_last());

        // Unfiltered, paged in two
        let query = ListQuery::collection("test.hylo.cloud", "v1", "widgets").limit(6);
        let first = store.list(&query).await.unwrap();
        assert_eq!(first.items.len(), 6);

        let second = store
            .list(&query.clone().after(first.continuation.clone().unwrap()))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 4);
        assert!(second.is_last());

        let first_names: Vec<_> = first.items.iter().map(|r| &r.metadata.name).collect();
        let second_names: Vec<_> = second.items.iter().map(|r| &r.metadata.name).collect();
        assert!(first_names.iter().all(|n| !second_names.contains(n)));
    }

    #[tokio::test]
    async fn test_list_namespace_filter() {
        let store = test_store().await;
        store.add(widget("w-1", "ns-a", 1), false).await.unwrap();
        store.add(widget("w-2", "ns-b", 2), false).await.unwrap();

        let query = ListQuery::collection("test.hylo.cloud", "v1", "widgets").in_namespace("ns-a");
        let page = store.list(&query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].metadata.name, "w-1");
    }

    #[tokio::test]
    async fn test_watch_sees_lifecycle() {
        let store = test_store().await;
        let mut stream = store.watch(
            WatchFilter::collection("test.hylo.cloud", "v1", "widgets").in_namespace("ns-a"),
        );

        store.add(widget("w-1", "ns-a", 3), false).await.unwrap();
        store.add(widget("w-2", "ns-b", 3), false).await.unwrap();
        store.remove(&widget_ref("ns-a", "w-1"), false).await.unwrap();

        let created = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.kind, EventKind::Created);
        assert_eq!(created.resource.metadata.name, "w-1");

        let deleted = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.kind, EventKind::Deleted);
        assert_eq!(deleted.resource.metadata.name, "w-1");
    }

    #[tokio::test]
    async fn test_dry_run_emits_no_events() {
        let store = test_store().await;
        let mut stream =
            store.watch(WatchFilter::collection("test.hylo.cloud", "v1", "widgets"));

        store.add(widget("w-1", "ns-a", 3), true).await.unwrap();
        assert!(
            timeout(Duration::from_millis(100), stream.next())
                .await
                .is_err(),
            "dry run must not notify watchers"
        );
    }
}
