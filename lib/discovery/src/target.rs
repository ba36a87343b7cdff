use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Label holding the address of a target once group and target labels are merged.
pub const ADDRESS_LABEL: &str = "__address__";

pub type Labels = BTreeMap<String, String>;

/// A single discoverable endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Target {
    /// Host or host:port of the endpoint.
    pub address: String,

    /// Labels specific to this target, they take precedence over the group labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// TargetGroup is a set of targets with a common tags
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TargetGroup {
    /// `targets` is a list of targets. Each target is uniquely identifiable in
    /// the group by its `address`.
    pub targets: Vec<Target>,

    /// `labels` is a set of labels that is common across all targets in the group
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,

    /// An identifier that describes a group of targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TargetGroup {
    /// Build a group, dropping targets whose address already appeared earlier
    /// in `targets`.
    pub fn new(targets: Vec<Target>, labels: Labels, source: Option<String>) -> Self {
        let mut seen = BTreeSet::new();
        let targets = targets
            .into_iter()
            .filter(|target| seen.insert(target.address.clone()))
            .collect();

        Self {
            targets,
            labels,
            source,
        }
    }

    /// Look up a label as seen by consumers: target labels overlay group labels,
    /// and `__address__` resolves to the target address.
    pub fn label<'a>(&'a self, target: &'a Target, key: &str) -> Option<&'a str> {
        if key == ADDRESS_LABEL {
            return Some(target.address.as_str());
        }

        target
            .labels
            .get(key)
            .or_else(|| self.labels.get(key))
            .map(String::as_str)
    }
}
