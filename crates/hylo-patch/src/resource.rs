//! Resource-level diff and equality
//!
//! Two resources are value-equal when the diff between their JSON forms is
//! empty; field order never matters.

use hylo_core::Resource;

use crate::apply::PatchOp;
use crate::diff::diff;
use crate::error::{PatchError, Result};

/// Compute the JSON Patch transforming `source` into `target`
pub fn diff_resources(source: &Resource, target: &Resource) -> Result<Vec<PatchOp>> {
    let left =
        serde_json::to_value(source).map_err(|e| PatchError::InvalidPatch(e.to_string()))?;
    let right =
        serde_json::to_value(target).map_err(|e| PatchError::InvalidPatch(e.to_string()))?;
    Ok(diff(&left, &right))
}

/// Value equality: true iff the diff between the two resources is empty
pub fn resources_equal(a: &Resource, b: &Resource) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
