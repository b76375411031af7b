//! resourceVersion allocation and conflict checks
//!
//! Versions are opaque to callers; the contract only promises strict
//! per-resource ordering. Both reference backends encode a per-resource
//! counter as a decimal string starting at `"1"`.

use crate::error::{Result, StoreError};

/// Version assigned on first persist
pub const INITIAL_VERSION: &str = "1";

/// The version a brand new resource gets
pub fn initial() -> String {
    INITIAL_VERSION.to_string()
}

/// The version following `current`
pub fn next(current: &str) -> String {
    match current.parse::<u64>() {
        Ok(value) => (value + 1).to_string(),
        // Foreign encodings restart the counter; ordering stays per-backend
        Err(_) => INITIAL_VERSION.to_string(),
    }
}

/// Compare the caller-supplied version against the stored one
///
/// `supplied` is what the caller last observed; a mismatch means a
/// concurrent write won and the caller must re-read.
pub fn check(supplied: Option<&str>, current: &str, name: &str) -> Result<()> {
    match supplied {
        None => Err(StoreError::MissingVersion {
            name: name.to_string(),
        }),
        Some(expected) if expected == current => Ok(()),
        Some(expected) => Err(StoreError::VersionConflict {
            name: name.to_string(),
            expected: expected.to_string(),
            current: current.to_string(),
        }),
    }
}
