//! Resource definitions: schema and scope metadata describing a kind
//!
//! A definition names a kind (group, kind, singular/plural, short names) and
//! lists its versions. Every version carries the JSON Schema its specs are
//! validated against; exactly one version is the storage version.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::validate;

/// Whether a kind lives inside a namespace or at cluster scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
    /// One instance set per cluster
    Cluster,

    /// Instances are partitioned by namespace
    Namespaced,
}

/// One servable version of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionVersion {
    /// Version name, e.g. `v1`
    pub name: String,

    /// Whether the API serves this version
    #[serde(default = "default_served")]
    pub served: bool,

    /// Whether this is the version resources are persisted as
    #[serde(default)]
    pub storage: bool,

    /// JSON Schema applied to the resource spec; empty means accept-all
    #[serde(default)]
    pub schema: JsonValue,

    /// Strategic-merge keys: JSON Pointer of an array field (from the
    /// resource root) mapped to the element field that identifies items
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub merge_keys: BTreeMap<String, String>,
}

fn default_served() -> bool {
    true
}

/// Schema and scope metadata describing a resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Cluster or namespaced
    pub scope: ResourceScope,

    /// API group, e.g. `admission.hylo.cloud`
    pub group: String,

    /// Kind name, e.g. `MutatingWebhook`
    pub kind: String,

    /// Singular resource name used in messages
    pub singular_name: String,

    /// Plural collection name used in references
    pub plural_name: String,

    /// Optional short aliases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,

    /// Served versions; exactly one must be the storage version
    pub versions: Vec<DefinitionVersion>,
}

impl ResourceDefinition {
    /// Parse a definition from YAML and check its invariants
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check the structural invariants of this definition
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| CoreError::InvalidDefinition {
            kind: self.kind.clone(),
            message: message.to_string(),
        };

        if self.group.is_empty() || self.kind.is_empty() {
            return Err(invalid("group and kind must not be empty"));
        }
        validate::validate_name(&self.singular_name)?;
        validate::validate_name(&self.plural_name)?;

        if self.versions.is_empty() {
            return Err(invalid("at least one version is required"));
        }
        let mut seen = std::collections::HashSet::new();
        for version in &self.versions {
            if !seen.insert(version.name.as_str()) {
                return Err(invalid("version names must be unique"));
            }
        }
        let storage_count = self.versions.iter().filter(|v| v.storage).count();
        if storage_count != 1 {
            return Err(invalid("exactly one version must be the storage version"));
        }
        Ok(())
    }

    /// Look up a version by name
    pub fn version(&self, name: &str) -> Option<&DefinitionVersion> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Look up a version by name, requiring it to be served
    pub fn served_version(&self, name: &str) -> Result<&DefinitionVersion> {
        self.version(name)
            .filter(|v| v.served)
            .ok_or_else(|| {
                CoreError::DefinitionMismatch(format!(
                    "version '{}' of {}/{} is not served",
                    name, self.group, self.kind
                ))
            })
    }

    /// The version resources are persisted as
    pub fn storage_version(&self) -> Result<&DefinitionVersion> {
        self.versions.iter().find(|v| v.storage).ok_or_else(|| {
            CoreError::InvalidDefinition {
                kind: self.kind.clone(),
                message: "no storage version".to_string(),
            }
        })
    }

    /// Whether instances of this kind live in namespaces
    pub fn is_namespaced(&self) -> bool {
        self.scope == ResourceScope::Namespaced
    }
}
