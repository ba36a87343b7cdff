use std::sync::Arc;

use async_trait::async_trait;

use crate::target::TargetGroup;

/// Discoverer provides information about target groups from one backend.
///
/// `Discoverer` does not know if an actual change happened, every call returns
/// the complete current list, or an error but never a partial list. The
/// scheduler never runs two calls concurrently on the same instance, and drops
/// the future to cancel a call.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn targets(&self) -> crate::Result<Vec<TargetGroup>>;
}

/// Builds a `Discoverer` out of a converted request.
pub trait DiscovererFactory<R>: Send + Sync {
    fn build(&self, request: R) -> crate::Result<Arc<dyn Discoverer>>;
}

impl<R, F> DiscovererFactory<R> for F
where
    F: Fn(R) -> crate::Result<Arc<dyn Discoverer>> + Send + Sync,
{
    fn build(&self, request: R) -> crate::Result<Arc<dyn Discoverer>> {
        self(request)
    }
}
