//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// A single schema violation and the JSON path it occurred at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorInfo {
    /// JSON path of the offending value ("(root)" for the top level)
    pub path: String,

    /// Human-readable message
    pub message: String,
}

/// Errors raised by the resource and definition model
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Resource name violates the naming convention
    #[error("invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Namespace violates the naming convention
    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    /// Label key violates the naming convention
    #[error("invalid label key '{key}': {reason}")]
    InvalidLabel { key: String, reason: String },

    /// No definition registered for the requested coordinates
    #[error("no resource definition for {group}/{version}/{plural}")]
    DefinitionNotFound {
        group: String,
        version: String,
        plural: String,
    },

    /// Definition failed its structural invariants
    #[error("invalid resource definition '{kind}': {message}")]
    InvalidDefinition { kind: String, message: String },

    /// Registration would mutate an already registered definition
    #[error("definition conflict for {group}/{kind}: {message}")]
    DefinitionConflict {
        group: String,
        kind: String,
        message: String,
    },

    /// Resource spec failed JSON Schema validation
    #[error("schema validation failed for '{name}' with {count} violation(s)", count = .errors.len())]
    SchemaValidation {
        name: String,
        errors: Vec<ValidationErrorInfo>,
    },

    /// Resource shape does not match its definition (kind, version, scope)
    #[error("resource does not match definition: {0}")]
    DefinitionMismatch(String),

    /// YAML parse failure (embedded assets, custom definitions)
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parse failure
    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl CoreError {
    /// Check if this is a missing-definition error (terminal, never retried)
    pub fn is_definition_not_found(&self) -> bool {
        matches!(self, CoreError::DefinitionNotFound { .. })
    }

    /// Check if this error was raised by name/namespace/label/schema validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidName { .. }
                | CoreError::InvalidNamespace { .. }
                | CoreError::InvalidLabel { .. }
                | CoreError::SchemaValidation { .. }
        )
    }
}
