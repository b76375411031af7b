//! Hylo Core - resource and definition model for the Hylo control plane
//!
//! This crate provides the foundational types used throughout Hylo:
//! - `Resource`: the typed envelope (group/version/kind, metadata, spec/status)
//! - `ResourceDefinition`: schema and scope metadata describing a kind
//! - `Registry`: explicit definition lookup seeded from embedded assets
//! - `LabelSelector`: predicates over label maps for list/watch filtering
//! - `SchemaValidator`: JSON Schema validation of resource specs

pub mod definition;
pub mod error;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod selector;
pub mod validate;

pub use definition::{DefinitionVersion, ResourceDefinition, ResourceScope};
pub use error::{CoreError, Result, ValidationErrorInfo};
pub use registry::{Registry, ADMISSION_GROUP, BUILTIN_VERSION, CORE_GROUP, RBAC_GROUP};
pub use resource::{GroupVersionKind, Resource, ResourceMetadata, ResourceReference};
pub use schema::{validate_spec, SchemaValidator};
pub use selector::{matches_all, LabelSelector, SelectorOp};
