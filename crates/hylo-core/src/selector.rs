//! Label selectors used to filter list and watch results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comparison operator of a label selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorOp {
    /// Label is present and equals the expected value
    Equals,

    /// Label is absent or differs from the expected value
    NotEquals,

    /// Label is present and equals any of the listed values
    Contains,

    /// Label is absent or equals none of the listed values
    NotContains,
}

/// Predicate over a resource's label map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Label key to test
    pub key: String,

    /// How to compare
    pub op: SelectorOp,

    /// Expected values; a single element for Equals/NotEquals
    pub values: Vec<String>,
}

impl LabelSelector {
    /// `key == value`
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: SelectorOp::Equals,
            values: vec![value.into()],
        }
    }

    /// `key != value`
    pub fn not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: SelectorOp::NotEquals,
            values: vec![value.into()],
        }
    }

    /// `key in values`
    pub fn contains(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            op: SelectorOp::Contains,
            values,
        }
    }

    /// `key not in values`
    pub fn not_contains(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            op: SelectorOp::NotContains,
            values,
        }
    }

    /// Evaluate this selector against a label map
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        match self.op {
            SelectorOp::Equals | SelectorOp::Contains => {
                actual.is_some_and(|v| self.values.iter().any(|expected| expected == v))
            }
            SelectorOp::NotEquals | SelectorOp::NotContains => {
                actual.is_none_or(|v| !self.values.iter().any(|expected| expected == v))
            }
        }
    }
}

/// True iff the labels satisfy every selector
pub fn matches_all(selectors: &[LabelSelector], labels: &BTreeMap<String, String>) -> bool {
    selectors.iter().all(|selector| selector.matches(labels))
}
