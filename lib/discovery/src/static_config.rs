//! Targets listed right in the configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::arguments::{Arguments, validate_refresh_interval};
use crate::discoverer::Discoverer;
use crate::error::ConfigError;
use crate::filter::{Filter, validate_all};
use crate::target::TargetGroup;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct StaticArguments {
    pub targets: Vec<TargetGroup>,

    /// How often the groups are republished, defaults to 30s.
    #[serde(
        default,
        with = "humanize::duration::serde_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_interval: Option<Duration>,

    /// Keep only targets whose labels match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

#[async_trait]
impl Arguments for StaticArguments {
    type Request = Vec<TargetGroup>;

    fn apply_defaults(&self) -> Self {
        Self {
            refresh_interval: Some(self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)),
            ..self.clone()
        }
    }

    async fn validate(&self) -> Result<Self, ConfigError> {
        validate_all(&self.filters)?;

        if let Some(interval) = self.refresh_interval {
            validate_refresh_interval(interval)?;
        }

        if let Some(group) = self
            .targets
            .iter()
            .find(|group| group.targets.iter().any(|target| target.address.is_empty()))
        {
            return Err(ConfigError::invalid(
                "targets",
                format!("empty address in group {:?}", group.source),
            ));
        }

        Ok(self.clone())
    }

    fn convert(&self) -> Vec<TargetGroup> {
        self.targets
            .iter()
            .enumerate()
            .map(|(index, group)| {
                TargetGroup::new(
                    group.targets.clone(),
                    group.labels.clone(),
                    group.source.clone().or_else(|| Some(index.to_string())),
                )
            })
            .collect()
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    fn label_filters(&self) -> Vec<Filter> {
        self.filters.clone()
    }
}

/// The factory of static discovery.
pub fn build(groups: Vec<TargetGroup>) -> crate::Result<Arc<dyn Discoverer>> {
    Ok(Arc::new(StaticDiscovery { groups }))
}

pub struct StaticDiscovery {
    groups: Vec<TargetGroup>,
}

#[async_trait]
impl Discoverer for StaticDiscovery {
    async fn targets(&self) -> crate::Result<Vec<TargetGroup>> {
        Ok(self.groups.clone())
    }
}
