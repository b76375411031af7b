//! JSON Patch operations and their ordered application

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{PatchError, Result};
use crate::pointer;

/// A single JSON Patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert or set the value at `path`
    Add { path: String, value: JsonValue },

    /// Remove the value at `path`; it must exist
    Remove { path: String },

    /// Overwrite the value at `path`; it must exist
    Replace { path: String, value: JsonValue },

    /// Remove the value at `from` and add it at `path`
    Move { from: String, path: String },

    /// Copy the value at `from` to `path`
    Copy { from: String, path: String },

    /// Assert that the value at `path` equals `value`
    Test { path: String, value: JsonValue },
}

impl PatchOp {
    /// The pointer this operation targets
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Move { path, .. }
            | PatchOp::Copy { path, .. }
            | PatchOp::Test { path, .. } => path,
        }
    }
}

/// Apply a patch, returning the transformed document
///
/// Operations run in order against a working copy; the input is untouched.
/// Fails with [`PatchError::TestFailed`] on a `test` mismatch and
/// [`PatchError::PathNotFound`] when a referenced path is absent.
pub fn apply(target: &JsonValue, ops: &[PatchOp]) -> Result<JsonValue> {
    let mut doc = target.clone();
    for op in ops {
        apply_op(&mut doc, op)?;
    }
    Ok(doc)
}

fn apply_op(doc: &mut JsonValue, op: &PatchOp) -> Result<()> {
    match op {
        PatchOp::Add { path, value } => add(doc, path, value.clone()),
        PatchOp::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOp::Replace { path, value } => replace(doc, path, value.clone()),
        PatchOp::Move { from, path } => {
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOp::Copy { from, path } => {
            let value = get(doc, from)?.clone();
            add(doc, path, value)
        }
        PatchOp::Test { path, value } => {
            let actual = get(doc, path)?;
            if actual == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed { path: path.clone() })
            }
        }
    }
}

/// Resolve a pointer to a shared reference
pub(crate) fn get<'a>(doc: &'a JsonValue, path: &str) -> Result<&'a JsonValue> {
    let tokens = pointer::split(path)?;
    let mut current = doc;
    for token in &tokens {
        current = match current {
            JsonValue::Object(map) => map.get(token).ok_or_else(|| not_found(path))?,
            JsonValue::Array(items) => {
                let index = parse_index(token, path)?;
                items.get(index).ok_or_else(|| not_found(path))?
            }
            _ => return Err(not_found(path)),
        };
    }
    Ok(current)
}

fn descend_mut<'a>(
    doc: &'a mut JsonValue,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut JsonValue> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            JsonValue::Object(map) => map.get_mut(token).ok_or_else(|| not_found(path))?,
            JsonValue::Array(items) => {
                let index = parse_index(token, path)?;
                items.get_mut(index).ok_or_else(|| not_found(path))?
            }
            _ => return Err(not_found(path)),
        };
    }
    Ok(current)
}

fn add(doc: &mut JsonValue, path: &str, value: JsonValue) -> Result<()> {
    let tokens = pointer::split(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = descend_mut(doc, parents, path)?;
    match parent {
        JsonValue::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        JsonValue::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                let index = parse_index(last, path)?;
                if index > items.len() {
                    return Err(not_found(path));
                }
                index
            };
            items.insert(index, value);
            Ok(())
        }
        _ => Err(not_found(path)),
    }
}

fn remove(doc: &mut JsonValue, path: &str) -> Result<JsonValue> {
    let tokens = pointer::split(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PatchError::InvalidPointer(path.to_string()));
    };
    let parent = descend_mut(doc, parents, path)?;
    match parent {
        JsonValue::Object(map) => map.remove(last).ok_or_else(|| not_found(path)),
        JsonValue::Array(items) => {
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Err(not_found(path));
            }
            Ok(items.remove(index))
        }
        _ => Err(not_found(path)),
    }
}

fn replace(doc: &mut JsonValue, path: &str, value: JsonValue) -> Result<()> {
    let tokens = pointer::split(path)?;
    if tokens.is_empty() {
        *doc = value;
        return Ok(());
    }
    let target = descend_mut(doc, &tokens, path)?;
    *target = value;
    Ok(())
}

fn parse_index(token: &str, path: &str) -> Result<usize> {
    // Leading zeros are not valid array indices per RFC 6901
    if token != "0" && token.starts_with('0') {
        return Err(not_found(path));
    }
    token.parse::<usize>().map_err(|_| not_found(path))
}

fn not_found(path: &str) -> PatchError {
    PatchError::PathNotFound {
        path: path.to_string(),
    }
}
