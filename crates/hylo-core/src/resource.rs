//! The typed resource envelope and its metadata
//!
//! A `Resource` is a value: group/version/kind plus metadata, a free-form
//! `spec` document and an optional `status` document. There is no type
//! hierarchy per kind; the matching [`ResourceDefinition`] carries the schema
//! the spec is validated against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::definition::{ResourceDefinition, ResourceScope};
use crate::error::{CoreError, Result};
use crate::validate;

/// Group, version and kind identifying a resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a new group/version/kind triple
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// The `apiVersion` string derived from group and version
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Non-owning locator for a resource within a collection
///
/// A reference never owns the resource it points at; resolving it may fail
/// with `NotFound` at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub group: String,
    pub version: String,
    pub plural: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceReference {
    /// Reference a cluster-scoped resource
    pub fn cluster(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Reference a namespaced resource
    pub fn namespaced(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::cluster(group, version, plural, name)
        }
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(
                f,
                "{}/{}/{}/{}/{}",
                self.group, self.version, self.plural, ns, self.name
            ),
            None => write!(
                f,
                "{}/{}/{}/{}",
                self.group, self.version, self.plural, self.name
            ),
        }
    }
}

/// Metadata carried by every resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Resource name, unique within its collection and namespace
    pub name: String,

    /// Namespace for namespaced kinds; absent for cluster scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Labels used by selectors; keys are DNS-label shaped
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Free-form annotations, not used for selection
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Set by the store on first persist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Opaque, strictly increasing per resource; assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Set when deletion has been requested but not completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ResourceMetadata {
    /// Metadata for a cluster-scoped resource
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata for a namespaced resource
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Add a label (builder style)
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Validate name, namespace presence and labels for the given scope
    pub fn validate(&self, scope: ResourceScope) -> Result<()> {
        validate::validate_name(&self.name)?;
        match (scope, &self.namespace) {
            (ResourceScope::Namespaced, Some(ns)) => validate::validate_namespace(ns)?,
            (ResourceScope::Namespaced, None) => {
                return Err(CoreError::InvalidNamespace {
                    namespace: String::new(),
                    reason: "namespaced resources require a namespace".to_string(),
                });
            }
            (ResourceScope::Cluster, Some(ns)) => {
                return Err(CoreError::InvalidNamespace {
                    namespace: ns.clone(),
                    reason: "cluster-scoped resources must not carry a namespace".to_string(),
                });
            }
            (ResourceScope::Cluster, None) => {}
        }
        validate::validate_labels(&self.labels)
    }
}

/// A typed, named, versioned record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// `group/version` of the definition version this resource uses
    pub api_version: String,

    /// Kind name from the definition
    pub kind: String,

    /// Name, namespace, labels and versioning
    pub metadata: ResourceMetadata,

    /// Desired-state document, validated against the definition schema
    #[serde(default)]
    pub spec: JsonValue,

    /// Observed-state document, absent until a controller reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JsonValue>,
}

impl Resource {
    /// Construct a resource for a served version of `definition`
    ///
    /// Validates the metadata against the definition's scope and naming
    /// convention. The schema check happens on the store write path, where
    /// the matching definition version is known to be authoritative.
    pub fn new(
        definition: &ResourceDefinition,
        version: &str,
        metadata: ResourceMetadata,
        spec: JsonValue,
    ) -> Result<Self> {
        definition.served_version(version)?;
        metadata.validate(definition.scope)?;
        Ok(Self {
            api_version: format!("{}/{}", definition.group, version),
            kind: definition.kind.clone(),
            metadata,
            spec,
            status: None,
        })
    }

    /// Group component of `apiVersion`
    pub fn group(&self) -> &str {
        self.api_version
            .split_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// Version component of `apiVersion`
    pub fn version(&self) -> &str {
        self.api_version
            .split_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.api_version)
    }

    /// The group/version/kind triple of this resource
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(self.group(), self.version(), &self.kind)
    }

    /// Serialize to a JSON tree for the patch engine
    pub fn to_value(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild from a JSON tree produced by the patch engine
    pub fn from_value(value: JsonValue) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
