use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::filter::Filter;

/// Arguments is the user facing configuration of one discovery backend.
///
/// Every step takes `&self` and hands back a new value, so the arguments a
/// component was built from are never edited behind the caller's back. The
/// lifecycle always runs in order: `apply_defaults`, `validate`, `convert`.
#[async_trait]
pub trait Arguments: Clone + Debug + Send + Sync + 'static {
    /// The request shape the discoverer factory of this backend consumes.
    type Request: Send + 'static;

    /// Fill every unset optional field with its default. Must be idempotent.
    fn apply_defaults(&self) -> Self;

    /// Reject structurally invalid arguments. Implementations may resolve
    /// missing advisory fields (e.g. region), which is why the checked value
    /// is returned instead of a plain `()`.
    async fn validate(&self) -> Result<Self, ConfigError>;

    /// Map validated arguments into the backend request. Pure and total, it
    /// never validates again.
    fn convert(&self) -> Self::Request;

    /// The cadence the scheduler polls at. Only meaningful after defaults
    /// were applied.
    fn refresh_interval(&self) -> Duration;

    /// Label filters the backend can't evaluate, they are applied on export.
    fn label_filters(&self) -> Vec<Filter> {
        Vec::new()
    }
}

/// Shared refresh interval check.
pub(crate) fn validate_refresh_interval(interval: Duration) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ZeroRefreshInterval);
    }

    Ok(())
}
