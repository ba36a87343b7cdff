use std::time::Duration;

use thiserror::Error;

/// A configuration that can never be used, it is returned to whoever supplied
/// it and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("filter name cannot be empty")]
    EmptyFilterName,

    #[error("filter values cannot be empty, filter: {name}")]
    EmptyFilterValues { name: String },

    #[error("refresh interval must be greater than zero")]
    ZeroRefreshInterval,

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },

    #[error("configuration requires a region, set `region` explicitly")]
    MissingRegion {
        #[source]
        source: Option<ResolutionError>,
    },

    #[error("load ambient configuration failed, {source}")]
    AmbientConfig {
        #[source]
        source: ResolutionError,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        ConfigError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Failure of the credential or region resolution chain.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("instance metadata service is disabled")]
    Disabled,

    #[error("instance metadata request timed out after {0:?}")]
    Timeout(Duration),

    #[error("instance metadata request failed, {0}")]
    Request(String),

    #[error("unexpected status code {0}")]
    UnexpectedStatus(http::StatusCode),

    #[error("profile `{0}` not found in shared config files")]
    ProfileNotFound(String),

    #[error("read {path} failed, {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single poll cycle failed, the loop keeps going.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("discover targets timed out after {0:?}")]
    Timeout(Duration),

    #[error("discover targets failed, {0}")]
    Discover(crate::Error),
}

/// Returned when a component can't be built or reconfigured.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("invalid configuration, {0}")]
    Config(#[from] ConfigError),

    #[error("build discoverer failed, {0}")]
    Build(crate::Error),
}
