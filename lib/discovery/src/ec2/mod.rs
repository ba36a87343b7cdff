//! Arguments of the EC2 discovery backend.
//!
//! Only the configuration side lives here: defaults, validation including the
//! region fallback chain, and the conversion into an [`Ec2Request`]. The
//! DescribeInstances call itself is provided by whoever builds the
//! [`crate::Component`], through its factory.

mod ambient;
mod imds;
mod region;

use std::time::Duration;

use async_trait::async_trait;
use http::Uri;
use serde::{Deserialize, Serialize};

pub use ambient::{AmbientConfig, CredentialSource, ResolvedCredentials};
pub use imds::{DEFAULT_ENDPOINT as DEFAULT_IMDS_ENDPOINT, ImdsRegionProbe, RegionProbe};
pub use region::{EnvironmentRegion, ProbeRegion, ProfileRegion, RegionChain, RegionResolver};

use crate::arguments::{Arguments, validate_refresh_interval};
use crate::error::ConfigError;
use crate::filter::{Filter, validate_all};
use crate::http::HttpClientConfig;
use crate::secret::SecretString;

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Discover EC2 instances of one region.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Ec2Arguments {
    /// Custom endpoint of the EC2 API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// The region to discover instances in. Resolved from the environment,
    /// the shared profile or the instance metadata service when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<SecretString>,

    /// Named profile of the shared config files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Role to assume with the base credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    /// How often instances are listed, defaults to 60s.
    #[serde(
        default,
        with = "humanize::duration::serde_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_interval: Option<Duration>,

    /// The port scraped when an instance address carries none, defaults to 80.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Filters passed to DescribeInstances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,

    #[serde(flatten)]
    pub http_client_config: HttpClientConfig,
}

/// What the EC2 discoverer factory is built from, every default resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Ec2Request {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<SecretString>,
    pub profile: Option<String>,
    pub role_arn: Option<String>,
    pub refresh_interval: Duration,
    pub port: u16,
    pub filters: Vec<Filter>,
    pub http_client_config: HttpClientConfig,
}

impl Ec2Arguments {
    /// Validate against explicit ambient settings and region chain instead of
    /// the process environment.
    pub async fn validate_with(
        &self,
        ambient: &AmbientConfig,
        chain: &RegionChain,
    ) -> Result<Self, ConfigError> {
        self.validate_structure()?;
        self.resolve_ambient(ambient, chain).await
    }

    /// Credential and region checks, for arguments already structurally valid.
    async fn resolve_ambient(
        &self,
        ambient: &AmbientConfig,
        chain: &RegionChain,
    ) -> Result<Self, ConfigError> {
        let credentials = ResolvedCredentials::resolve(
            self.access_key.is_some(),
            self.profile.as_deref(),
            self.role_arn.as_deref(),
            ambient,
        );
        match &credentials {
            Some(credentials) => {
                debug!(
                    message = "credentials resolved",
                    source = ?credentials.source,
                    assume_role = ?credentials.assume_role
                );
            }
            None if self.role_arn.is_some() => {
                return Err(ConfigError::invalid(
                    "role_arn",
                    "no base credentials found to assume the role with",
                ));
            }
            None => {
                debug!(message = "no credentials found, requests will be anonymous");
            }
        }

        let mut validated = self.clone();
        if validated.region.is_none() {
            match chain.resolve(ambient).await {
                Ok(Some(region)) => validated.region = Some(region),
                Ok(None) => return Err(ConfigError::MissingRegion { source: None }),
                Err(err) => return Err(ConfigError::MissingRegion { source: Some(err) }),
            }
        }

        Ok(validated)
    }

    /// Checks that need nothing but the arguments themselves.
    fn validate_structure(&self) -> Result<(), ConfigError> {
        validate_all(&self.filters)?;

        if let Some(interval) = self.refresh_interval {
            validate_refresh_interval(interval)?;
        }

        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(ConfigError::invalid("region", "cannot be blank"));
            }
        }

        if self.port == Some(0) {
            return Err(ConfigError::invalid("port", "must be greater than zero"));
        }

        if let Some(endpoint) = &self.endpoint {
            let uri = endpoint
                .parse::<Uri>()
                .map_err(|err| ConfigError::invalid("endpoint", err))?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(ConfigError::invalid(
                    "endpoint",
                    "scheme and host are required",
                ));
            }
        }

        match (&self.access_key, &self.secret_key) {
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "access_key",
                    missing: "secret_key",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    present: "secret_key",
                    missing: "access_key",
                });
            }
            _ => {}
        }

        self.http_client_config.validate()
    }
}

#[async_trait]
impl Arguments for Ec2Arguments {
    type Request = Ec2Request;

    fn apply_defaults(&self) -> Self {
        Self {
            port: Some(self.port.unwrap_or(DEFAULT_PORT)),
            refresh_interval: Some(self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)),
            ..self.clone()
        }
    }

    async fn validate(&self) -> Result<Self, ConfigError> {
        // ambient config is only loaded for structurally valid arguments
        self.validate_structure()?;

        let ambient = AmbientConfig::load(self.profile.as_deref())
            .map_err(|source| ConfigError::AmbientConfig { source })?;

        self.resolve_ambient(&ambient, &RegionChain::default()).await
    }

    fn convert(&self) -> Ec2Request {
        Ec2Request {
            endpoint: self.endpoint.clone(),
            region: self.region.clone().unwrap_or_default(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            profile: self.profile.clone(),
            role_arn: self.role_arn.clone(),
            refresh_interval: self.refresh_interval(),
            port: self.port.unwrap_or(DEFAULT_PORT),
            filters: self.filters.clone(),
            http_client_config: self.http_client_config.clone(),
        }
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }
}
