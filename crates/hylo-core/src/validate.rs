//! Naming convention checks for resource metadata
//!
//! Names, namespaces and label keys all follow the DNS-label convention:
//! lowercase alphanumerics and `-`, starting and ending with an alphanumeric.
//! Names and namespaces may be up to 253 characters, label keys up to 63.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Maximum length for resource names and namespaces
pub const MAX_NAME_LEN: usize = 253;

/// Maximum length for label keys
pub const MAX_LABEL_KEY_LEN: usize = 63;

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static pattern compiles"));

fn check_dns_label(value: &str, max_len: usize) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > max_len {
        return Err(format!("must be at most {} characters", max_len));
    }
    if !DNS_LABEL.is_match(value) {
        return Err(
            "must be lowercase alphanumeric or '-', and start and end alphanumeric".to_string(),
        );
    }
    Ok(())
}

/// Validate a resource name against the naming convention
pub fn validate_name(name: &str) -> Result<()> {
    check_dns_label(name, MAX_NAME_LEN).map_err(|reason| CoreError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Validate a namespace against the naming convention
pub fn validate_namespace(namespace: &str) -> Result<()> {
    check_dns_label(namespace, MAX_NAME_LEN).map_err(|reason| CoreError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason,
    })
}

/// Validate a single label key
pub fn validate_label_key(key: &str) -> Result<()> {
    check_dns_label(key, MAX_LABEL_KEY_LEN).map_err(|reason| CoreError::InvalidLabel {
        key: key.to_string(),
        reason,
    })
}

/// Validate every key of a label map
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Result<()> {
    for key in labels.keys() {
        validate_label_key(key)?;
    }
    Ok(())
}
