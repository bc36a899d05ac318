//! Label selectors for picking a MinIO instance
//!
//! Mirrors the Kubernetes `LabelSelector` shape (`matchLabels` plus
//! `matchExpressions`) so bucket manifests can use the same syntax as any
//! other workload selector. Query rendering and matching go through
//! kube's [`Selector`].

use kube::core::{Expression, Selector, SelectorExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Selects `MinIOInstance` objects by their labels.
///
/// An empty selector matches every instance in the namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSelector {
    /// Exact label matches; all entries must match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements; all entries must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

/// A single set-based label requirement.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// Relationship between the key and the values
    pub operator: SelectorOperator,

    /// Values for `In` and `NotIn`; must be empty for `Exists` and `DoesNotExist`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Operators supported by [`SelectorRequirement`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SelectorOperator {
    /// Label value must be one of `values`
    In,
    /// Label must be absent or its value not one of `values`
    NotIn,
    /// Label key must be present
    Exists,
    /// Label key must be absent
    DoesNotExist,
}

impl InstanceSelector {
    /// Selector requiring every given label to match exactly
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            match_expressions: Vec::new(),
        }
    }

    /// True when the selector has no requirements at all
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// The equivalent kube-rs [`Selector`], usable with
    /// `ListParams::labels_from` and for local matching
    pub fn to_selector(&self) -> Selector {
        self.match_labels
            .iter()
            .map(|(k, v)| Expression::Equal(k.clone(), v.clone()))
            .chain(self.match_expressions.iter().map(SelectorRequirement::to_expression))
            .collect()
    }

    /// Render the selector in the API server's label query syntax
    /// (`app=minio,tier in (a,b),!legacy`).
    ///
    /// An empty selector renders as an empty string, which the API server
    /// treats as "everything".
    pub fn label_query(&self) -> String {
        self.to_selector().to_string()
    }

    /// Evaluate the selector against a label map
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.to_selector().matches(labels)
    }
}

impl SelectorRequirement {
    fn to_expression(&self) -> Expression {
        let key = self.key.clone();
        let values = || self.values.iter().cloned().collect::<BTreeSet<_>>();
        match self.operator {
            SelectorOperator::In => Expression::In(key, values()),
            SelectorOperator::NotIn => Expression::NotIn(key, values()),
            SelectorOperator::Exists => Expression::Exists(key),
            SelectorOperator::DoesNotExist => Expression::DoesNotExist(key),
        }
    }
}

impl fmt::Display for InstanceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.label_query())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_label_query_formats_labels_and_expressions() {
        let selector = InstanceSelector {
            match_labels: labels(&[("tier", "storage"), ("app", "minio")]),
            match_expressions: vec![
                SelectorRequirement {
                    key: "zone".to_string(),
                    operator: SelectorOperator::In,
                    values: vec!["b".to_string(), "a".to_string()],
                },
                SelectorRequirement {
                    key: "legacy".to_string(),
                    operator: SelectorOperator::DoesNotExist,
                    values: vec![],
                },
                SelectorRequirement {
                    key: "owner".to_string(),
                    operator: SelectorOperator::Exists,
                    values: vec![],
                },
            ],
        };

        assert_eq!(
            selector.label_query(),
            "app=minio,tier=storage,zone in (a,b),!legacy,owner"
        );
    }

    #[test]
    fn test_empty_selector_renders_empty_query() {
        let selector = InstanceSelector::default();
        assert!(selector.is_empty());
        assert_eq!(selector.label_query(), "");
        assert_eq!(selector.to_string(), "<none>");
    }

    #[test]
    fn test_matches_exact_labels() {
        let selector = InstanceSelector::from_labels([("app", "minio")]);
        assert!(selector.matches(&labels(&[("app", "minio"), ("extra", "x")])));
        assert!(!selector.matches(&labels(&[("app", "other")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_not_in_matches_missing_key() {
        let selector = InstanceSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![SelectorRequirement {
                key: "env".to_string(),
                operator: SelectorOperator::NotIn,
                values: vec!["prod".to_string()],
            }],
        };
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("env", "dev")])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_to_selector_lists_labels_then_expressions() {
        let selector = InstanceSelector {
            match_labels: labels(&[("app", "minio")]),
            match_expressions: vec![SelectorRequirement {
                key: "legacy".to_string(),
                operator: SelectorOperator::DoesNotExist,
                values: vec![],
            }],
        };
        let expected: Selector = [
            Expression::Equal("app".to_string(), "minio".to_string()),
            Expression::DoesNotExist("legacy".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(selector.to_selector(), expected);
        assert!(InstanceSelector::default().to_selector().selects_all());
    }

    #[test]
    fn test_selector_deserializes_kubernetes_shape() {
        let json = serde_json::json!({
            "matchLabels": {"app": "minio"},
            "matchExpressions": [{"key": "zone", "operator": "In", "values": ["a"]}]
        });
        let selector: InstanceSelector = serde_json::from_value(json).expect("valid selector");
        assert_eq!(selector.match_labels.get("app").map(String::as_str), Some("minio"));
        assert_eq!(selector.match_expressions[0].operator, SelectorOperator::In);
    }
}
