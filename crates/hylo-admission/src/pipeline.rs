//! The admission gate in front of every repository write
//!
//! Per inbound command the pipeline resolves the resource definition,
//! selects the matching mutating webhooks, invokes them sequentially in
//! priority order (applying returned patches between calls), repeats for
//! validating webhooks, and forwards to the repository only when every
//! review succeeded. A failing webhook never short-circuits the rest: the
//! aggregate rejection carries every collected error, and on rejection the
//! repository is never touched.

use serde_json::Value as JsonValue;
use std::sync::Arc;

use hylo_core::{Registry, Resource, ResourceDefinition, ResourceReference};
use hylo_patch::{Patch, PatchOp};
use hylo_store::{patched_resource, ResourceStore};

use crate::client::WebhookInvoker;
use crate::error::{AdmissionError, Result};
use crate::review::{
    review_id, AdmissionRequest, AdmissionResponse, AdmissionReview, ReviewContext, ReviewError,
};
use crate::rules::{Operation, RuleCandidate};
use crate::webhook::{WebhookKind, WebhookRegistry};

/// Webhook-gated front of a resource store
pub struct AdmissionPipeline<S> {
    registry: Arc<Registry>,
    webhooks: Arc<WebhookRegistry>,
    invoker: Arc<dyn WebhookInvoker>,
    store: S,
}

impl<S: ResourceStore> AdmissionPipeline<S> {
    /// Assemble a pipeline in front of `store`
    pub fn new(
        registry: Arc<Registry>,
        webhooks: Arc<WebhookRegistry>,
        invoker: Arc<dyn WebhookInvoker>,
        store: S,
    ) -> Self {
        Self {
            registry,
            webhooks,
            invoker,
            store,
        }
    }

    /// The guarded store, for reads and watches that bypass admission
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The webhook registry backing this pipeline
    pub fn webhooks(&self) -> &WebhookRegistry {
        &self.webhooks
    }

    /// Gate and create a resource
    pub async fn add(&self, resource: Resource, dry_run: bool) -> Result<Resource> {
        let definition = self
            .registry
            .definition_for_kind(resource.group(), &resource.kind)?;
        let candidate = candidate_for(&definition, &resource, Operation::Create);
        let (admitted, context) = self.run_webhooks(candidate, resource).await;
        check(context)?;
        Ok(self.store.add(admitted, dry_run).await?)
    }

    /// Gate and replace a resource
    pub async fn replace(&self, resource: Resource, dry_run: bool) -> Result<Resource> {
        let definition = self
            .registry
            .definition_for_kind(resource.group(), &resource.kind)?;
        let candidate = candidate_for(&definition, &resource, Operation::Update);
        let (admitted, context) = self.run_webhooks(candidate, resource).await;
        check(context)?;
        Ok(self.store.replace(admitted, dry_run).await?)
    }

    /// Load, patch, gate the patched snapshot and replace
    pub async fn patch(
        &self,
        reference: &ResourceReference,
        patch: Patch,
        dry_run: bool,
    ) -> Result<Resource> {
        let definition = self.registry.resolve(reference)?;
        let current = self.store.get(reference).await?;
        let patched = patched_resource(&definition, &current, &patch)?;

        let candidate = RuleCandidate {
            group: definition.group.clone(),
            version: reference.version.clone(),
            kind: definition.kind.clone(),
            namespace: reference.namespace.clone(),
            operation: Operation::Patch,
        };
        let (admitted, context) = self.run_webhooks(candidate, patched).await;
        check(context)?;
        Ok(self.store.replace(admitted, dry_run).await?)
    }

    /// Gate and delete a resource, returning the pre-deletion snapshot
    ///
    /// Webhooks review the current stored snapshot; a mutating patch on a
    /// delete has nothing left to mutate and is ignored.
    pub async fn remove(&self, reference: &ResourceReference, dry_run: bool) -> Result<Resource> {
        let definition = self.registry.resolve(reference)?;
        let current = self.store.get(reference).await?;

        let candidate = RuleCandidate {
            group: definition.group.clone(),
            version: reference.version.clone(),
            kind: definition.kind.clone(),
            namespace: reference.namespace.clone(),
            operation: Operation::Delete,
        };
        let (_, context) = self.run_webhooks(candidate, current).await;
        check(context)?;
        Ok(self.store.remove(reference, dry_run).await?)
    }

    /// Invoke the mutating then validating phase for one candidate
    async fn run_webhooks(
        &self,
        candidate: RuleCandidate,
        resource: Resource,
    ) -> (Resource, ReviewContext) {
        let mut context = ReviewContext::new();
        let mut current = resource;
        let apply_patches = candidate.operation != Operation::Delete;

        for webhook in self.webhooks.resolve(WebhookKind::Mutating, &candidate) {
            let request = AdmissionRequest {
                id: review_id(),
                operation: candidate.operation,
                resource: current.clone(),
            };
            let mut response = match self.invoker.review(&webhook.client.uri, &request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(webhook = %webhook.name, error = %e, "webhook unreachable");
                    AdmissionResponse::unreachable(request.id.clone(), e.to_string())
                }
            };

            if response.succeeded && apply_patches {
                if let Some(document) = response.patch.clone() {
                    match apply_webhook_patch(&current, &document) {
                        Ok(mutated) => current = mutated,
                        Err(reason) => {
                            // A broken patch fails the review; the gate
                            // stays closed rather than persisting guesswork
                            tracing::warn!(webhook = %webhook.name, %reason, "rejecting webhook patch");
                            response.succeeded = false;
                            response
                                .errors
                                .push(ReviewError::message(format!("patch rejected: {}", reason)));
                        }
                    }
                }
            }
            context.push(AdmissionReview {
                webhook: webhook.name.clone(),
                request,
                response,
            });
        }

        for webhook in self.webhooks.resolve(WebhookKind::Validating, &candidate) {
            let request = AdmissionRequest {
                id: review_id(),
                operation: candidate.operation,
                resource: current.clone(),
            };
            let response = match self.invoker.review(&webhook.client.uri, &request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(webhook = %webhook.name, error = %e, "webhook unreachable");
                    AdmissionResponse::unreachable(request.id.clone(), e.to_string())
                }
            };
            if response.patch.is_some() {
                tracing::debug!(webhook = %webhook.name, "ignoring patch from validating webhook");
            }
            context.push(AdmissionReview {
                webhook: webhook.name.clone(),
                request,
                response,
            });
        }

        (current, context)
    }
}

fn candidate_for(
    definition: &ResourceDefinition,
    resource: &Resource,
    operation: Operation,
) -> RuleCandidate {
    RuleCandidate {
        group: definition.group.clone(),
        version: resource.version().to_string(),
        kind: definition.kind.clone(),
        namespace: resource.metadata.namespace.clone(),
        operation,
    }
}

fn check(context: ReviewContext) -> Result<()> {
    if context.succeeded() {
        Ok(())
    } else {
        Err(AdmissionError::Rejected {
            errors: context.errors(),
        })
    }
}

fn apply_webhook_patch(current: &Resource, document: &JsonValue) -> std::result::Result<Resource, String> {
    let ops: Vec<PatchOp> =
        serde_json::from_value(document.clone()).map_err(|e| e.to_string())?;
    let value = current.to_value().map_err(|e| e.to_string())?;
    let patched = hylo_patch::apply(&value, &ops).map_err(|e| e.to_string())?;
    Resource::from_value(patched).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InvokeError;
    use crate::review::AdmissionResponse;
    use crate::rules::RuleWithOperation;
    use crate::webhook::Webhook;
    use async_trait::async_trait;
    use hylo_core::{
        DefinitionVersion, ResourceMetadata, ResourceScope,
    };
    use hylo_store::{EventHub, InProcessBus, MemoryStore, StoreError};
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// Canned per-endpoint behavior for pipeline tests
    enum Scripted {
        Allow,
        AllowWithPatch(serde_json::Value),
        Reject(Vec<ReviewError>),
        Unreachable,
    }

    struct ScriptedInvoker {
        responses: HashMap<String, Scripted>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn new(responses: Vec<(&str, Scripted)>) -> Arc<Self> {
            Arc::new(Self {
                responses: responses
                    .into_iter()
                    .map(|(uri, scripted)| (uri.to_string(), scripted))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookInvoker for ScriptedInvoker {
        async fn review(
            &self,
            uri: &str,
            request: &AdmissionRequest,
        ) -> std::result::Result<AdmissionResponse, InvokeError> {
            self.calls.lock().unwrap().push(uri.to_string());
            match self.responses.get(uri) {
                Some(Scripted::Allow) => Ok(AdmissionResponse::allowed(request.id.clone())),
                Some(Scripted::AllowWithPatch(patch)) => Ok(AdmissionResponse::allowed_with_patch(
                    request.id.clone(),
                    patch.clone(),
                )),
                Some(Scripted::Reject(errors)) => Ok(AdmissionResponse::rejected(
                    request.id.clone(),
                    errors.clone(),
                )),
                Some(Scripted::Unreachable) | None => Err(InvokeError::Status(503)),
            }
        }
    }

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
                schema: json!({"type": "object"}),
                merge_keys: BTreeMap::new(),
            }],
        }
    }

    async fn pipeline(
        webhooks: Vec<Webhook>,
        invoker: Arc<ScriptedInvoker>,
    ) -> AdmissionPipeline<MemoryStore> {
        let registry = Arc::new(Registry::new());
        registry.register(widget_definition()).unwrap();

        let hooks = Arc::new(WebhookRegistry::new());
        for webhook in webhooks {
            hooks.register(webhook);
        }

        let events = EventHub::start("test-replica", Arc::new(InProcessBus::new())).await;
        let store = MemoryStore::new(Arc::clone(&registry), events);
        AdmissionPipeline::new(registry, hooks, invoker, store)
    }

    fn widget(name: &str) -> Resource {
        Resource {
            api_version: "test.hylo.cloud/v1".to_string(),
            kind: "Widget".to_string(),
            metadata: ResourceMetadata::namespaced(name, "ns-a"),
            spec: json!({"size": 3}),
            status: None,
        }
    }

    fn widget_ref(name: &str) -> ResourceReference {
        ResourceReference::namespaced("test.hylo.cloud", "v1", "widgets", "ns-a", name)
    }

    #[tokio::test]
    async fn test_no_webhooks_forwards_to_store() {
        let invoker = ScriptedInvoker::new(vec![]);
        let pipeline = pipeline(vec![], Arc::clone(&invoker)).await;

        let stored = pipeline.add(widget("w-1"), false).await.unwrap();
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("1"));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mutating_patch_is_applied_before_store() {
        let invoker = ScriptedInvoker::new(vec![(
            "http://defaulter",
            Scripted::AllowWithPatch(json!([
                {"op": "add", "path": "/spec/color", "value": "blue"}
            ])),
        )]);
        let pipeline = pipeline(
            vec![Webhook::mutating("defaulter", "http://defaulter")],
            Arc::clone(&invoker),
        )
        .await;

        let stored = pipeline.add(widget("w-1"), false).await.unwrap();
        assert_eq!(stored.spec["color"], "blue");

        let fetched = pipeline.store().get(&widget_ref("w-1")).await.unwrap();
        assert_eq!(fetched.spec["color"], "blue");
    }

    #[tokio::test]
    async fn test_validating_rejection_blocks_the_store() {
        let invoker = ScriptedInvoker::new(vec![
            (
                "http://strict",
                Scripted::Reject(vec![ReviewError::field("spec.x", "required")]),
            ),
            ("http://lenient", Scripted::Allow),
        ]);
        let pipeline = pipeline(
            vec![
                Webhook::validating("strict", "http://strict"),
                Webhook::validating("lenient", "http://lenient"),
            ],
            Arc::clone(&invoker),
        )
        .await;

        let result = pipeline.add(widget("w-1"), false).await;
        match result {
            Err(AdmissionError::Rejected { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "spec.x");
                assert_eq!(errors[0].message, "required");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        // Both webhooks ran; the repository was never touched
        assert_eq!(invoker.calls().len(), 2);
        let fetch = pipeline.store().get(&widget_ref("w-1")).await;
        assert!(matches!(fetch, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_fails_closed() {
        let invoker =
            ScriptedInvoker::new(vec![("http://down", Scripted::Unreachable)]);
        let pipeline = pipeline(
            vec![Webhook::validating("down", "http://down")],
            Arc::clone(&invoker),
        )
        .await;

        let result = pipeline.add(widget("w-1"), false).await;
        match result {
            Err(AdmissionError::Rejected { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].message.contains("unreachable"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(matches!(
            pipeline.store().get(&widget_ref("w-1")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_priority_orders_invocations() {
        let invoker = ScriptedInvoker::new(vec![
            ("http://second", Scripted::Allow),
            ("http://first", Scripted::Allow),
        ]);
        let pipeline = pipeline(
            vec![
                Webhook::mutating("second", "http://second").with_priority(10),
                Webhook::mutating("first", "http://first").with_priority(1),
            ],
            Arc::clone(&invoker),
        )
        .await;

        pipeline.add(widget("w-1"), false).await.unwrap();
        assert_eq!(invoker.calls(), vec!["http://first", "http://second"]);
    }

    #[tokio::test]
    async fn test_rejection_does_not_short_circuit_mutating_phase() {
        let invoker = ScriptedInvoker::new(vec![
            (
                "http://reject-a",
                Scripted::Reject(vec![ReviewError::field("spec.a", "bad a")]),
            ),
            (
                "http://reject-b",
                Scripted::Reject(vec![ReviewError::field("spec.b", "bad b")]),
            ),
        ]);
        let pipeline = pipeline(
            vec![
                Webhook::mutating("a", "http://reject-a").with_priority(1),
                Webhook::mutating("b", "http://reject-b").with_priority(2),
            ],
            Arc::clone(&invoker),
        )
        .await;

        let result = pipeline.add(widget("w-1"), false).await;
        match result {
            Err(AdmissionError::Rejected { errors }) => {
                assert_eq!(errors.len(), 2, "all feedback must be collected");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rules_filter_webhooks() {
        let invoker = ScriptedInvoker::new(vec![("http://gadgets", Scripted::Allow)]);
        let pipeline = pipeline(
            vec![
                Webhook::validating("gadgets-only", "http://gadgets").with_rules(vec![
                    RuleWithOperation {
                        kinds: Some(vec!["Gadget".to_string()]),
                        ..Default::default()
                    },
                ]),
            ],
            Arc::clone(&invoker),
        )
        .await;

        pipeline.add(widget("w-1"), false).await.unwrap();
        assert!(invoker.calls().is_empty(), "non-matching webhook must be skipped");
    }

    #[tokio::test]
    async fn test_remove_reviews_snapshot_and_ignores_patches() {
        let invoker = ScriptedInvoker::new(vec![(
            "http://meddler",
            Scripted::AllowWithPatch(json!([
                {"op": "replace", "path": "/spec/size", "value": 99}
            ])),
        )]);
        let pipeline = pipeline(
            vec![
                Webhook::mutating("meddler", "http://meddler").with_rules(vec![
                    RuleWithOperation {
                        operations: Some(vec![Operation::Delete]),
                        ..Default::default()
                    },
                ]),
            ],
            Arc::clone(&invoker),
        )
        .await;

        pipeline.add(widget("w-1"), false).await.unwrap();
        let snapshot = pipeline.remove(&widget_ref("w-1"), false).await.unwrap();

        // The webhook ran for the delete, but its patch had nothing to
        // mutate: the snapshot is the stored state, untouched
        assert_eq!(snapshot.spec["size"], 3);
        assert_eq!(invoker.calls(), vec!["http://meddler"]);
        assert!(matches!(
            pipeline.store().get(&widget_ref("w-1")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dry_run_runs_the_full_gate_without_persisting() {
        let invoker = ScriptedInvoker::new(vec![("http://observer", Scripted::Allow)]);
        let pipeline = pipeline(
            vec![Webhook::validating("observer", "http://observer")],
            Arc::clone(&invoker),
        )
        .await;

        let previewed = pipeline.add(widget("w-1"), true).await.unwrap();
        assert_eq!(previewed.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(invoker.calls().len(), 1, "admission runs on dry-run too");
        assert!(matches!(
            pipeline.store().get(&widget_ref("w-1")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_patch_command_gates_the_patched_snapshot() {
        let invoker = ScriptedInvoker::new(vec![("http://observer", Scripted::Allow)]);
        let pipeline = pipeline(
            vec![Webhook::validating("observer", "http://observer")],
            Arc::clone(&invoker),
        )
        .await;

        pipeline.add(widget("w-1"), false).await.unwrap();
        let patched = pipeline
            .patch(
                &widget_ref("w-1"),
                Patch::merge(json!({"spec": {"size": 7}})),
                false,
            )
            .await
            .unwrap();

        assert_eq!(patched.spec["size"], 7);
        assert_eq!(patched.metadata.resource_version.as_deref(), Some("2"));
        // add + patch both passed the gate
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_store_conflicts_pass_through() {
        let invoker = ScriptedInvoker::new(vec![]);
        let pipeline = pipeline(vec![], Arc::clone(&invoker)).await;

        let stored = pipeline.add(widget("w-1"), false).await.unwrap();
        let mut fresh = stored.clone();
        fresh.spec = json!({"size": 4});
        pipeline.replace(fresh, false).await.unwrap();

        let mut stale = stored;
        stale.spec = json!({"size": 5});
        let result = pipeline.replace(stale, false).await;
        assert!(matches!(
            result,
            Err(AdmissionError::Store(StoreError::VersionConflict { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_definition_aborts_before_webhooks() {
        let invoker = ScriptedInvoker::new(vec![("http://observer", Scripted::Allow)]);
        let pipeline = pipeline(
            vec![Webhook::validating("observer", "http://observer")],
            Arc::clone(&invoker),
        )
        .await;

        let mut unknown = widget("w-1");
        unknown.kind = "Gadget".to_string();
        let result = pipeline.add(unknown, false).await;
        match result {
            Err(AdmissionError::Core(e)) => assert!(e.is_definition_not_found()),
            other => panic!("expected definition failure, got {:?}", other),
        }
        assert!(invoker.calls().is_empty());
    }
}
