/**
 * Label selectors for peer discovery
 *
 * A `Selector` is derived once from the owning workload and then used for
 * every List and Watch call. It renders to the API server's label selector
 * syntax and can also be evaluated locally against an object's labels.
 */
use super::utils::{format_label_selector, select};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("unknown label selector operator {operator:?} for key {key:?}")]
    UnknownOperator { key: String, operator: String },

    #[error("operator {operator} on key {key:?} needs at least one value")]
    MissingValues { key: String, operator: String },
}

/// A set-based selector term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Expression {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Self::In(key, values) => write!(f, "{key} in ({})", join(values)),
            Self::NotIn(key, values) => write!(f, "{key} notin ({})", join(values)),
            Self::Exists(key) => write!(f, "{key}"),
            Self::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

/// Immutable label predicate shared by every List and Watch call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    labels: BTreeMap<String, String>,
    expressions: Vec<Expression>,
}

impl Selector {
    #[must_use]
    pub fn new(labels: BTreeMap<String, String>, expressions: Vec<Expression>) -> Self {
        Self {
            labels,
            expressions,
        }
    }

    /// An empty selector would match every object in the namespace
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.expressions.is_empty()
    }

    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        select(&self.labels, labels) && self.expressions.iter().all(|e| e.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::with_capacity(1 + self.expressions.len());
        if !self.labels.is_empty() {
            terms.push(format_label_selector(&self.labels));
        }
        terms.extend(self.expressions.iter().map(ToString::to_string));
        write!(f, "{}", terms.join(","))
    }
}

impl From<BTreeMap<String, String>> for Selector {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self::new(labels, Vec::new())
    }
}

impl TryFrom<&LabelSelector> for Selector {
    type Error = SelectorError;

    fn try_from(selector: &LabelSelector) -> Result<Self, Self::Error> {
        let labels = selector.match_labels.clone().unwrap_or_default();
        let mut expressions = Vec::new();

        for req in selector.match_expressions.iter().flatten() {
            let values: BTreeSet<String> = req.values.iter().flatten().cloned().collect();
            let key = req.key.clone();
            let expression = match req.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(SelectorError::MissingValues {
                        key,
                        operator: req.operator.clone(),
                    });
                }
                "In" => Expression::In(key, values),
                "NotIn" => Expression::NotIn(key, values),
                "Exists" => Expression::Exists(key),
                "DoesNotExist" => Expression::DoesNotExist(key),
                other => {
                    return Err(SelectorError::UnknownOperator {
                        key,
                        operator: other.to_string(),
                    });
                }
            };
            expressions.push(expression);
        }

        Ok(Self::new(labels, expressions))
    }
}
