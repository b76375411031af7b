//! Diff computation between JSON trees
//!
//! `diff` produces the operation sequence transforming one document into
//! another: objects are compared by key, arrays by index. Two documents are
//! equal exactly when their diff is empty, which is the structural equality
//! the rest of the control plane relies on.

use serde_json::Value as JsonValue;

use crate::apply::PatchOp;
use crate::pointer;

/// Compute the ordered operation sequence transforming `source` into `target`
pub fn diff(source: &JsonValue, target: &JsonValue) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_values("", source, target, &mut ops);
    ops
}

/// Structural equality, ignoring object key order
///
/// Equivalent to `diff(a, b).is_empty()` without allocating the operations.
pub fn equal(a: &JsonValue, b: &JsonValue) -> bool {
    a == b
}

fn diff_values(path: &str, source: &JsonValue, target: &JsonValue, ops: &mut Vec<PatchOp>) {
    if source == target {
        return;
    }
    match (source, target) {
        (JsonValue::Object(source_map), JsonValue::Object(target_map)) => {
            for (key, source_value) in source_map {
                let child = format!("{}/{}", path, pointer::escape(key));
                match target_map.get(key) {
                    Some(target_value) => diff_values(&child, source_value, target_value, ops),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, target_value) in target_map {
                if !source_map.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: format!("{}/{}", path, pointer::escape(key)),
                        value: target_value.clone(),
                    });
                }
            }
        }
        (JsonValue::Array(source_items), JsonValue::Array(target_items)) => {
            let shared = source_items.len().min(target_items.len());
            for index in 0..shared {
                diff_values(
                    &format!("{}/{}", path, index),
                    &source_items[index],
                    &target_items[index],
                    ops,
                );
            }
            // Surplus source elements go highest index first so earlier
            // removals do not shift the paths of later ones.
            for index in (shared..source_items.len()).rev() {
                ops.push(PatchOp::Remove {
                    path: format!("{}/{}", path, index),
                });
            }
            for index in shared..target_items.len() {
                ops.push(PatchOp::Add {
                    path: format!("{}/{}", path, index),
                    value: target_items[index].clone(),
                });
            }
        }
        _ => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: target.clone(),
        }),
    }
}
