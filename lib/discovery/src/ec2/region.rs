use std::sync::Arc;

use async_trait::async_trait;

use super::ambient::AmbientConfig;
use super::imds::{ImdsRegionProbe, RegionProbe};
use crate::error::ResolutionError;

/// One strategy of the region fallback chain. `Ok(None)` means the strategy
/// does not apply and the next one should be asked.
#[async_trait]
pub trait RegionResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ambient: &AmbientConfig) -> Result<Option<String>, ResolutionError>;
}

/// `AWS_REGION` or `AWS_DEFAULT_REGION`.
pub struct EnvironmentRegion;

#[async_trait]
impl RegionResolver for EnvironmentRegion {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn resolve(&self, ambient: &AmbientConfig) -> Result<Option<String>, ResolutionError> {
        Ok(ambient.env_region.clone())
    }
}

/// The `region` of the selected shared config profile.
pub struct ProfileRegion;

#[async_trait]
impl RegionResolver for ProfileRegion {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn resolve(&self, ambient: &AmbientConfig) -> Result<Option<String>, ResolutionError> {
        Ok(ambient.profile_region().map(ToString::to_string))
    }
}

/// Ask a region probe, by default the instance metadata service at the
/// endpoint found in the ambient config.
pub struct ProbeRegion {
    probe: Option<Arc<dyn RegionProbe>>,
}

impl ProbeRegion {
    pub fn new(probe: Arc<dyn RegionProbe>) -> Self {
        Self { probe: Some(probe) }
    }

    pub fn instance_metadata() -> Self {
        Self { probe: None }
    }
}

#[async_trait]
impl RegionResolver for ProbeRegion {
    fn name(&self) -> &'static str {
        "instance_metadata"
    }

    async fn resolve(&self, ambient: &AmbientConfig) -> Result<Option<String>, ResolutionError> {
        match &self.probe {
            Some(probe) => probe.region().await.map(Some),
            None => {
                if ambient.imds_disabled {
                    return Err(ResolutionError::Disabled);
                }

                ImdsRegionProbe::with_endpoint(ambient.imds_endpoint.as_deref())?
                    .region()
                    .await
                    .map(Some)
            }
        }
    }
}

/// Ordered region resolvers, the first one that answers wins.
pub struct RegionChain {
    resolvers: Vec<Box<dyn RegionResolver>>,
}

impl Default for RegionChain {
    /// environment, then shared profile, then instance metadata
    fn default() -> Self {
        Self::new(vec![
            Box::new(EnvironmentRegion),
            Box::new(ProfileRegion),
            Box::new(ProbeRegion::instance_metadata()),
        ])
    }
}

impl RegionChain {
    pub fn new(resolvers: Vec<Box<dyn RegionResolver>>) -> Self {
        Self { resolvers }
    }

    /// Walk the chain. When nothing answers, the last failure, if any, is
    /// returned so the caller can explain why.
    pub async fn resolve(&self, ambient: &AmbientConfig) -> Result<Option<String>, ResolutionError> {
        let mut last_err = None;

        for resolver in &self.resolvers {
            match resolver.resolve(ambient).await {
                Ok(Some(region)) => {
                    debug!(message = "region resolved", resolver = resolver.name(), %region);

                    return Ok(Some(region));
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(message = "resolve region failed", resolver = resolver.name(), %err);

                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}
