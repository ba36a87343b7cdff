use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::target::{Target, TargetGroup};

/// Filter narrows discovered targets to those whose attribute `name` holds
/// one of `values`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    /// The attribute, or label, to match on.
    pub name: String,

    /// Accepted values, at least one is required.
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyFilterName);
        }

        if self.values.is_empty() {
            return Err(ConfigError::EmptyFilterValues {
                name: self.name.clone(),
            });
        }

        Ok(())
    }

    fn matches(&self, group: &TargetGroup, target: &Target) -> bool {
        group
            .label(target, &self.name)
            .is_some_and(|value| self.values.iter().any(|expected| expected == value))
    }
}

/// Validate every filter, the first invalid one wins.
pub fn validate_all(filters: &[Filter]) -> Result<(), ConfigError> {
    filters.iter().try_for_each(Filter::validate)
}

/// Keep targets accepted by all filters. Groups are kept even if no target
/// survives, so consumers can tell that a source became empty.
pub fn apply(filters: &[Filter], groups: &[TargetGroup]) -> Vec<TargetGroup> {
    if filters.is_empty() {
        return groups.to_vec();
    }

    groups
        .iter()
        .map(|group| {
            let targets = group
                .targets
                .iter()
                .filter(|target| filters.iter().all(|filter| filter.matches(group, target)))
                .cloned()
                .collect();

            TargetGroup {
                targets,
                labels: group.labels.clone(),
                source: group.source.clone(),
            }
        })
        .collect()
}
