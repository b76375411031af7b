//! JSON Schema validation of resource specs
//!
//! Every definition version carries a JSON Schema; the store validates a
//! resource's spec against the schema of the version it is written as. An
//! empty (null) schema accepts everything.

use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result, ValidationErrorInfo};

/// Schema validator with a cached compiled schema
pub struct SchemaValidator {
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a validator from a definition version's schema
    pub fn new(schema: &JsonValue) -> Result<Self> {
        // A null schema means "accept everything"
        let effective = if schema.is_null() {
            JsonValue::Bool(true)
        } else {
            schema.clone()
        };
        let compiled = jsonschema::validator_for(&effective).map_err(|e| {
            CoreError::InvalidDefinition {
                kind: String::new(),
                message: format!("invalid schema: {}", e),
            }
        })?;
        Ok(Self { compiled })
    }

    /// Collect every violation of `document` against the schema
    pub fn check(&self, document: &JsonValue) -> Vec<ValidationErrorInfo> {
        if self.compiled.is_valid(document) {
            return Vec::new();
        }
        self.compiled
            .iter_errors(document)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: e.to_string(),
                }
            })
            .collect()
    }

    /// Validate `document`, failing with every collected violation
    pub fn validate(&self, resource_name: &str, document: &JsonValue) -> Result<()> {
        let errors = self.check(document);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::SchemaValidation {
                name: resource_name.to_string(),
                errors,
            })
        }
    }
}

/// One-shot spec validation against a definition version's schema
pub fn validate_spec(schema: &JsonValue, resource_name: &str, spec: &JsonValue) -> Result<()> {
    SchemaValidator::new(schema)?.validate(resource_name, spec)
}
