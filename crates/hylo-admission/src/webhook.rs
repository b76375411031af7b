//! Webhook model and registration
//!
//! Webhooks are resources themselves (group `admission.hylo.cloud`); the
//! registry here holds the parsed form in registration order, which is the
//! stable tie-break when priorities are equal.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use hylo_core::{Resource, ADMISSION_GROUP};

use crate::error::{AdmissionError, Result};
use crate::rules::{RuleCandidate, RuleWithOperation};

/// Which pipeline phase a webhook runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    /// May return a patch that is applied before the next webhook
    Mutating,

    /// Verdict only; returned patches are ignored
    Validating,
}

/// Target endpoint of a webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookClientConfig {
    /// URI the admission request is POSTed to
    pub uri: String,
}

/// A registered admission webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Resource name of the webhook
    pub name: String,

    /// Mutating or validating
    pub kind: WebhookKind,

    /// Where to deliver reviews
    pub client: WebhookClientConfig,

    /// Rules selecting the resources this webhook applies to;
    /// absent applies it to everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<RuleWithOperation>>,

    /// Lower values are evaluated first
    #[serde(default)]
    pub priority: i32,
}

/// The spec document of a stored webhook resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookSpec {
    client: WebhookClientConfig,
    #[serde(default)]
    resources: Option<Vec<RuleWithOperation>>,
    #[serde(default)]
    priority: i32,
}

impl Webhook {
    /// A mutating webhook applying to everything
    pub fn mutating(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: WebhookKind::Mutating,
            client: WebhookClientConfig { uri: uri.into() },
            resources: None,
            priority: 0,
        }
    }

    /// A validating webhook applying to everything
    pub fn validating(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: WebhookKind::Validating,
            client: WebhookClientConfig { uri: uri.into() },
            resources: None,
            priority: 0,
        }
    }

    /// Set the priority (builder style)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict to resources matching any of the rules (builder style)
    pub fn with_rules(mut self, rules: Vec<RuleWithOperation>) -> Self {
        self.resources = Some(rules);
        self
    }

    /// Parse a stored `MutatingWebhook`/`ValidatingWebhook` resource
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        let kind = match (resource.group(), resource.kind.as_str()) {
            (ADMISSION_GROUP, "MutatingWebhook") => WebhookKind::Mutating,
            (ADMISSION_GROUP, "ValidatingWebhook") => WebhookKind::Validating,
            _ => {
                return Err(AdmissionError::InvalidWebhook {
                    name: resource.metadata.name.clone(),
                    reason: format!(
                        "{}/{} is not a webhook kind",
                        resource.group(),
                        resource.kind
                    ),
                });
            }
        };
        let spec: WebhookSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| {
            AdmissionError::InvalidWebhook {
                name: resource.metadata.name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            name: resource.metadata.name.clone(),
            kind,
            client: spec.client,
            resources: spec.resources,
            priority: spec.priority,
        })
    }

    /// Whether this webhook applies to the candidate
    pub fn applies_to(&self, candidate: &RuleCandidate) -> bool {
        match &self.resources {
            None => true,
            Some(rules) => rules.iter().any(|rule| rule.matches(candidate)),
        }
    }
}

/// Registered webhooks, kept in registration order per phase
#[derive(Default)]
pub struct WebhookRegistry {
    mutating: RwLock<Vec<Webhook>>,
    validating: RwLock<Vec<Webhook>>,
}

impl WebhookRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a webhook at the end of its phase's order
    pub fn register(&self, webhook: Webhook) {
        let list = match webhook.kind {
            WebhookKind::Mutating => &self.mutating,
            WebhookKind::Validating => &self.validating,
        };
        list.write().unwrap_or_else(|e| e.into_inner()).push(webhook);
    }

    /// Register a webhook parsed from a stored resource
    pub fn register_resource(&self, resource: &Resource) -> Result<()> {
        self.register(Webhook::from_resource(resource)?);
        Ok(())
    }

    /// The matching webhooks of one phase, priority-sorted with stable
    /// registration-order tie-break
    pub fn resolve(&self, kind: WebhookKind, candidate: &RuleCandidate) -> Vec<Webhook> {
        let list = match kind {
            WebhookKind::Mutating => &self.mutating,
            WebhookKind::Validating => &self.validating,
        };
        let mut matching: Vec<Webhook> = list
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|webhook| webhook.applies_to(candidate))
            .cloned()
            .collect();
        // sort_by_key is stable, so equal priorities keep registration order
        matching.sort_by_key(|webhook| webhook.priority);
        matching
    }

    /// Number of registered webhooks across both phases
    pub fn len(&self) -> usize {
        self.mutating.read().unwrap_or_else(|e| e.into_inner()).len()
            + self.validating.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no webhooks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Operation;
    use hylo_core::ResourceMetadata;
    use serde_json::json;

    fn candidate() -> RuleCandidate {
        RuleCandidate {
            group: "test.hylo.cloud".to_string(),
            version: "v1".to_string(),
            kind: "Widget".to_string(),
            namespace: Some("ns-a".to_string()),
            operation: Operation::Create,
        }
    }

    #[test]
    fn test_resolve_orders_by_priority_then_registration() {
        let registry = WebhookRegistry::new();
        registry.register(Webhook::mutating("late", "http://one").with_priority(10));
        registry.register(Webhook::mutating("first", "http://two").with_priority(1));
        registry.register(Webhook::mutating("tied", "http://three").with_priority(1));

        let resolved = registry.resolve(WebhookKind::Mutating, &candidate());
        let names: Vec<&str> = resolved.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["first", "tied", "late"]);
    }

    #[test]
    fn test_resolve_filters_by_rules() {
        let registry = WebhookRegistry::new();
        registry.register(Webhook::validating("widgets-only", "http://a").with_rules(vec![
            RuleWithOperation {
                kinds: Some(vec!["Widget".to_string()]),
                ..Default::default()
            },
        ]));
        registry.register(Webhook::validating("gadgets-only", "http://b").with_rules(vec![
            RuleWithOperation {
                kinds: Some(vec!["Gadget".to_string()]),
                ..Default::default()
            },
        ]));

        let resolved = registry.resolve(WebhookKind::Validating, &candidate());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "widgets-only");
    }

    #[test]
    fn test_phases_are_separate() {
        let registry = WebhookRegistry::new();
        registry.register(Webhook::mutating("m", "http://m"));
        registry.register(Webhook::validating("v", "http://v"));

        assert_eq!(registry.resolve(WebhookKind::Mutating, &candidate()).len(), 1);
        assert_eq!(
            registry.resolve(WebhookKind::Validating, &candidate())[0].name,
            "v"
        );
    }

    #[test]
    fn test_from_resource() {
        let resource = Resource {
            api_version: "admission.hylo.cloud/v1".to_string(),
            kind: "MutatingWebhook".to_string(),
            metadata: ResourceMetadata::named("defaulter"),
            spec: json!({
                "client": { "uri": "https://hooks.internal/default" },
                "priority": 5,
                "resources": [
                    { "apiGroups": ["test\\.hylo\\.cloud"], "operations": ["create"] }
                ]
            }),
            status: None,
        };

        let webhook = Webhook::from_resource(&resource).unwrap();
        assert_eq!(webhook.kind, WebhookKind::Mutating);
        assert_eq!(webhook.priority, 5);
        assert_eq!(webhook.client.uri, "https://hooks.internal/default");
        assert_eq!(webhook.resources.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_from_resource_rejects_other_kinds() {
        let resource = Resource {
            api_version: "core.hylo.cloud/v1".to_string(),
            kind: "Namespace".to_string(),
            metadata: ResourceMetadata::named("ns-a"),
            spec: json!({}),
            status: None,
        };
        assert!(matches!(
            Webhook::from_resource(&resource),
            Err(AdmissionError::InvalidWebhook { .. })
        ));
    }

    #[test]
    fn test_from_resource_requires_client() {
        let resource = Resource {
            api_version: "admission.hylo.cloud/v1".to_string(),
            kind: "ValidatingWebhook".to_string(),
            metadata: ResourceMetadata::named("no-client"),
            spec: json!({ "priority": 1 }),
            status: None,
        };
        assert!(matches!(
            Webhook::from_resource(&resource),
            Err(AdmissionError::InvalidWebhook { .. })
        ));
    }
}
