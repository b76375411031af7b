//! JSON Merge Patch (RFC 7386) and schema-aware strategic merge
//!
//! Merge patch: `null` deletes keys, objects merge recursively, scalars and
//! arrays replace wholesale. Strategic merge behaves the same except for
//! array fields whose JSON Pointer carries a declared merge key in the
//! resource definition: those arrays merge element-wise by key, and an
//! element carrying `"$patch": "delete"` removes its counterpart.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::pointer;

/// Merge keys declared by a definition version: array-field pointer -> key
pub type MergeKeys = BTreeMap<String, String>;

/// Directive field marking a keyed element for deletion
pub const PATCH_DIRECTIVE: &str = "$patch";

/// Apply an RFC 7386 merge patch
pub fn merge_patch(target: &JsonValue, patch: &JsonValue) -> JsonValue {
    match patch {
        JsonValue::Object(patch_map) => {
            let mut result = match target {
                JsonValue::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    result.remove(key);
                } else {
                    let base = result.get(key).cloned().unwrap_or(JsonValue::Null);
                    result.insert(key.clone(), merge_patch(&base, patch_value));
                }
            }
            JsonValue::Object(result)
        }
        other => other.clone(),
    }
}

/// Apply a strategic merge patch using the definition's merge keys
pub fn strategic_merge(target: &JsonValue, patch: &JsonValue, keys: &MergeKeys) -> JsonValue {
    merge_at("", target, patch, keys)
}

fn merge_at(path: &str, target: &JsonValue, patch: &JsonValue, keys: &MergeKeys) -> JsonValue {
    match patch {
        JsonValue::Object(patch_map) => {
            let mut result = match target {
                JsonValue::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    result.remove(key);
                    continue;
                }
                let child = format!("{}/{}", path, pointer::escape(key));
                let base = result.get(key).cloned().unwrap_or(JsonValue::Null);
                result.insert(key.clone(), merge_at(&child, &base, patch_value, keys));
            }
            JsonValue::Object(result)
        }
        JsonValue::Array(patch_items) => match (target, keys.get(path)) {
            (JsonValue::Array(target_items), Some(key_field)) => {
                merge_keyed_array(target_items, patch_items, key_field)
            }
            _ => patch.clone(),
        },
        other => other.clone(),
    }
}

fn merge_keyed_array(
    target_items: &[JsonValue],
    patch_items: &[JsonValue],
    key_field: &str,
) -> JsonValue {
    let mut result: Vec<JsonValue> = target_items.to_vec();
    for patch_item in patch_items {
        let Some(key_value) = patch_item.get(key_field) else {
            // Elements without the key have no identity to merge on
            result.push(patch_item.clone());
            continue;
        };
        let position = result
            .iter()
            .position(|item| item.get(key_field) == Some(key_value));
        let delete = patch_item
            .get(PATCH_DIRECTIVE)
            .and_then(JsonValue::as_str)
            == Some("delete");
        match (position, delete) {
            (Some(index), true) => {
                result.remove(index);
            }
            (None, true) => {}
            (Some(index), false) => {
                let merged = merge_patch(&result[index], patch_item);
                result[index] = merged;
            }
            (None, false) => result.push(patch_item.clone()),
        }
    }
    JsonValue::Array(result)
}
