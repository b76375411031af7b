//! The transient patch document consumed by repository writes
//!
//! A `Patch` is produced by a caller or a mutating webhook and consumed
//! exactly once by the write path. The document is opaque until applied;
//! `patch_type` selects the semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::apply::{apply, PatchOp};
use crate::error::{PatchError, Result};
use crate::merge::{merge_patch, strategic_merge, MergeKeys};

/// Supported patch representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchType {
    /// RFC 6902 operation list
    JsonPatch,

    /// RFC 7386 merge document
    JsonMergePatch,

    /// Merge document with definition-declared keyed arrays
    StrategicMergePatch,
}

/// A patch document plus the semantics to apply it with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// How to interpret `document`
    pub patch_type: PatchType,

    /// The opaque patch document
    pub document: JsonValue,
}

impl Patch {
    /// A JSON Patch from an operation list
    pub fn json(ops: Vec<PatchOp>) -> Result<Self> {
        let document =
            serde_json::to_value(ops).map_err(|e| PatchError::InvalidPatch(e.to_string()))?;
        Ok(Self {
            patch_type: PatchType::JsonPatch,
            document,
        })
    }

    /// A JSON Merge Patch
    pub fn merge(document: JsonValue) -> Self {
        Self {
            patch_type: PatchType::JsonMergePatch,
            document,
        }
    }

    /// A strategic merge patch
    pub fn strategic(document: JsonValue) -> Self {
        Self {
            patch_type: PatchType::StrategicMergePatch,
            document,
        }
    }

    /// Apply this patch to a document
    ///
    /// `merge_keys` comes from the resource's definition version and is only
    /// consulted by strategic merge.
    pub fn apply_to(&self, target: &JsonValue, merge_keys: &MergeKeys) -> Result<JsonValue> {
        match self.patch_type {
            PatchType::JsonPatch => {
                let ops: Vec<PatchOp> = serde_json::from_value(self.document.clone())
                    .map_err(|e| PatchError::InvalidPatch(e.to_string()))?;
                apply(target, &ops)
            }
            PatchType::JsonMergePatch => Ok(merge_patch(target, &self.document)),
            PatchType::StrategicMergePatch => {
                Ok(strategic_merge(target, &self.document, merge_keys))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_patch_roundtrip_through_document() {
        let patch = Patch::json(vec![PatchOp::Add {
            path: "/spec/size".to_string(),
            value: json!(3),
        }])
        .unwrap();

        let out = patch
            .apply_to(&json!({"spec": {}}), &MergeKeys::new())
            .unwrap();
        assert_eq!(out, json!({"spec": {"size": 3}}));
    }

    #[test]
    fn test_malformed_json_patch_document() {
        let patch = Patch {
            patch_type: PatchType::JsonPatch,
            document: json!({"not": "an array"}),
        };
        let result = patch.apply_to(&json!({}), &MergeKeys::new());
        assert!(matches!(result, Err(PatchError::InvalidPatch(_))));
    }

    #[test]
    fn test_merge_patch_dispatch() {
        let patch = Patch::merge(json!({"spec": {"color": null, "size": 5}}));
        let out = patch
            .apply_to(&json!({"spec": {"color": "red"}}), &MergeKeys::new())
            .unwrap();
        assert_eq!(out, json!({"spec": {"size": 5}}));
    }

    #[test]
    fn test_patch_type_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(PatchType::StrategicMergePatch).unwrap(),
            json!("strategicMergePatch")
        );
    }
}
