//! Rule-based selection of webhooks
//!
//! A webhook declares which resources and operations it applies to through
//! `RuleWithOperation` filters. Every field is optional; an absent list
//! matches everything, and a rule matches a candidate only when every
//! present list has at least one entry matching the corresponding field.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Operations a rule can select on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Patch,
    Delete,
    Watch,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
            Operation::Watch => "watch",
        };
        write!(f, "{}", name)
    }
}

/// The resource-and-operation a rule is matched against
#[derive(Debug, Clone)]
pub struct RuleCandidate {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub operation: Operation,
}

/// Filter describing which resources and operations a webhook applies to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleWithOperation {
    /// Namespace-match regex; absent matches every scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Regexes over the API group; absent matches all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_groups: Option<Vec<String>>,

    /// Regexes over the API version; absent matches all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_versions: Option<Vec<String>>,

    /// Regexes over the kind; absent matches all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<String>>,

    /// Operations the rule covers; absent matches all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<Operation>>,
}

impl RuleWithOperation {
    /// Whether this rule matches the candidate
    pub fn matches(&self, candidate: &RuleCandidate) -> bool {
        if let Some(operations) = &self.operations {
            if !operations.contains(&candidate.operation) {
                return false;
            }
        }
        if !matches_any(self.api_groups.as_deref(), &candidate.group) {
            return false;
        }
        if !matches_any(self.api_versions.as_deref(), &candidate.version) {
            return false;
        }
        if !matches_any(self.kinds.as_deref(), &candidate.kind) {
            return false;
        }
        if let Some(scope) = &self.scope {
            // Cluster-scoped candidates match against the empty string
            let namespace = candidate.namespace.as_deref().unwrap_or("");
            if !pattern_matches(scope, namespace) {
                return false;
            }
        }
        true
    }
}

fn matches_any(patterns: Option<&[String]>, value: &str) -> bool {
    match patterns {
        None => true,
        Some(patterns) => patterns.iter().any(|pattern| pattern_matches(pattern, value)),
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    // A pattern that does not compile matches nothing
    Regex::new(pattern)
        .map(|regex| regex.is_match(value))
        .unwrap_or(false)
}
