//! Definition registry with O(1) coordinate lookup
//!
//! The registry is an explicit value constructed once at process start and
//! handed by reference to every component that resolves definitions (stores,
//! the admission pipeline). There are no global statics; tests build their
//! own isolated registries.
//!
//! Built-in definitions ship as embedded YAML assets and are registered by
//! [`Registry::with_builtins`]; custom definitions register at runtime.
//! Once a (group, kind) pair is registered it is immutable except for adding
//! new versions.

use indexmap::IndexMap;
use std::sync::{Arc, RwLock};

use crate::definition::ResourceDefinition;
use crate::error::{CoreError, Result};
use crate::resource::ResourceReference;

/// API group of the built-in core kinds
pub const CORE_GROUP: &str = "core.hylo.cloud";

/// API group of the admission webhook kinds
pub const ADMISSION_GROUP: &str = "admission.hylo.cloud";

/// API group of the access-control kinds
pub const RBAC_GROUP: &str = "rbac.hylo.cloud";

/// Version served by every built-in definition
pub const BUILTIN_VERSION: &str = "v1";

const BUILTIN_ASSETS: &[&str] = &[
    include_str!("../assets/resource-definition.yaml"),
    include_str!("../assets/namespace.yaml"),
    include_str!("../assets/user-account.yaml"),
    include_str!("../assets/mutating-webhook.yaml"),
    include_str!("../assets/validating-webhook.yaml"),
    include_str!("../assets/role.yaml"),
    include_str!("../assets/cluster-role.yaml"),
    include_str!("../assets/role-binding.yaml"),
];

/// Coordinates a definition is looked up by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Coordinates {
    group: String,
    version: String,
    plural: String,
}

#[derive(Default)]
struct RegistryInner {
    /// (group, version, plural) -> definition; one entry per served version
    by_coordinates: IndexMap<Coordinates, Arc<ResourceDefinition>>,

    /// (group, kind) -> definition; used for the immutability rule
    by_kind: IndexMap<(String, String), Arc<ResourceDefinition>>,
}

/// Registered resource definitions
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// An empty registry (tests, custom setups)
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// A registry seeded with every built-in definition
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        for asset in BUILTIN_ASSETS {
            registry.register(ResourceDefinition::from_yaml(asset)?)?;
        }
        Ok(registry)
    }

    /// Register a definition, or add versions to an existing one
    ///
    /// A (group, kind) pair already registered may only gain versions: the
    /// scope, names and every existing version must be carried over
    /// unchanged, and no version may be removed.
    pub fn register(&self, definition: ResourceDefinition) -> Result<()> {
        definition.validate()?;

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let kind_key = (definition.group.clone(), definition.kind.clone());

        if let Some(existing) = inner.by_kind.get(&kind_key) {
            check_only_adds_versions(existing, &definition)?;
        }

        // A collection name may not be claimed by two kinds.
        for version in &definition.versions {
            let coordinates = Coordinates {
                group: definition.group.clone(),
                version: version.name.clone(),
                plural: definition.plural_name.clone(),
            };
            if let Some(claimed) = inner.by_coordinates.get(&coordinates) {
                if claimed.kind != definition.kind {
                    return Err(CoreError::DefinitionConflict {
                        group: definition.group.clone(),
                        kind: definition.kind.clone(),
                        message: format!(
                            "collection '{}' already belongs to kind '{}'",
                            definition.plural_name, claimed.kind
                        ),
                    });
                }
            }
        }

        let definition = Arc::new(definition);
        for version in &definition.versions {
            inner.by_coordinates.insert(
                Coordinates {
                    group: definition.group.clone(),
                    version: version.name.clone(),
                    plural: definition.plural_name.clone(),
                },
                Arc::clone(&definition),
            );
        }
        inner.by_kind.insert(kind_key, definition);
        Ok(())
    }

    /// Look up the definition serving (group, version, plural)
    pub fn definition(&self, group: &str, version: &str, plural: &str) -> Result<Arc<ResourceDefinition>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_coordinates
            .get(&Coordinates {
                group: group.to_string(),
                version: version.to_string(),
                plural: plural.to_string(),
            })
            .cloned()
            .ok_or_else(|| CoreError::DefinitionNotFound {
                group: group.to_string(),
                version: version.to_string(),
                plural: plural.to_string(),
            })
    }

    /// Look up the definition a reference points into
    pub fn resolve(&self, reference: &ResourceReference) -> Result<Arc<ResourceDefinition>> {
        self.definition(&reference.group, &reference.version, &reference.plural)
    }

    /// Look up a definition by group and kind
    pub fn definition_for_kind(&self, group: &str, kind: &str) -> Result<Arc<ResourceDefinition>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_kind
            .get(&(group.to_string(), kind.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::DefinitionNotFound {
                group: group.to_string(),
                version: String::new(),
                plural: kind.to_string(),
            })
    }

    /// Every registered definition, in registration order
    pub fn definitions(&self) -> Vec<Arc<ResourceDefinition>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_kind.values().cloned().collect()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_kind.len()
    }

    /// Whether no kinds are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_only_adds_versions(
    existing: &ResourceDefinition,
    replacement: &ResourceDefinition,
) -> Result<()> {
    let conflict = |message: String| CoreError::DefinitionConflict {
        group: existing.group.clone(),
        kind: existing.kind.clone(),
        message,
    };

    if replacement.scope != existing.scope
        || replacement.singular_name != existing.singular_name
        || replacement.plural_name != existing.plural_name
        || replacement.short_names != existing.short_names
    {
        return Err(conflict(
            "scope and names are immutable once registered".to_string(),
        ));
    }
    for version in &existing.versions {
        match replacement.version(&version.name) {
            Some(kept) if kept == version => {}
            Some(_) => {
                return Err(conflict(format!(
                    "version '{}' may not be modified",
                    version.name
                )));
            }
            None => {
                return Err(conflict(format!(
                    "version '{}' may not be removed",
                    version.name
                )));
            }
        }
    }
    Ok(())
}
