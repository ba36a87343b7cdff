use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::arguments::Arguments;
use crate::discoverer::DiscovererFactory;
use crate::error::UpdateError;
use crate::scheduler;
use crate::shutdown::{self, Trigger};
use crate::state::{Active, Shared, Snapshot, Status};

/// Component ties one backend's arguments to a running refresh loop.
///
/// ```text
/// arguments -> apply_defaults -> validate -> convert -> factory -> refresh loop -> export
/// ```
///
/// `update` re-enters at `apply_defaults` and swaps the result in atomically,
/// leaving the running loop untouched when any step fails.
pub struct Component<A: Arguments> {
    shared: Arc<Shared>,
    factory: Box<dyn DiscovererFactory<A::Request>>,

    // arguments exactly as supplied, resolved values are not written back
    arguments: Mutex<A>,
    updating: tokio::sync::Mutex<()>,

    trigger: Trigger,
    handle: Option<JoinHandle<()>>,
}

impl<A: Arguments> Component<A> {
    /// Build and start a component. Must be called within a tokio runtime.
    pub async fn new<F>(arguments: A, factory: F) -> Result<Self, UpdateError>
    where
        F: DiscovererFactory<A::Request> + 'static,
    {
        let active = prepare(&arguments, &factory).await?;
        let shared = Arc::new(Shared::new(active));
        let (trigger, signal) = shutdown::pair();
        let handle = tokio::spawn(scheduler::run(Arc::clone(&shared), signal));

        Ok(Self {
            shared,
            factory: Box::new(factory),
            arguments: Mutex::new(arguments),
            updating: tokio::sync::Mutex::new(()),
            trigger,
            handle: Some(handle),
        })
    }

    /// Reconfigure the running component. On error the previous arguments stay
    /// fully active. A poll already in flight finishes against the previous
    /// discoverer.
    pub async fn update(&self, arguments: A) -> Result<(), UpdateError> {
        let _updating = self.updating.lock().await;

        let active = prepare(&arguments, self.factory.as_ref()).await?;
        let refresh_interval = active.refresh_interval;

        self.shared.swap(active);
        *self
            .arguments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = arguments;

        info!(message = "discovery reconfigured", ?refresh_interval);

        Ok(())
    }

    /// The current target groups, narrowed by the label filters. Calls between
    /// two polls return the very same `Arc`.
    pub fn export(&self) -> Snapshot {
        self.shared.export()
    }

    /// Get notified whenever a new snapshot is exported.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.subscribe()
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// The arguments as last supplied by the user.
    pub fn arguments(&self) -> A {
        self.arguments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop the refresh loop, cancelling any poll in flight. Returns once the
    /// loop has exited.
    pub async fn shutdown(mut self) {
        self.trigger.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!(message = "discovery refresh loop panicked", %err);
            }
        }
    }
}

impl<A: Arguments> Drop for Component<A> {
    fn drop(&mut self) {
        // dropped without `shutdown`, the loop still has to stop
        self.trigger.cancel();
    }
}

/// Run the whole lifecycle without touching any live state.
async fn prepare<A, F>(arguments: &A, factory: &F) -> Result<Active, UpdateError>
where
    A: Arguments,
    F: DiscovererFactory<A::Request> + ?Sized,
{
    let validated = arguments.apply_defaults().validate().await?;
    let request = validated.convert();
    let discoverer = factory.build(request).map_err(UpdateError::Build)?;

    Ok(Active {
        discoverer,
        refresh_interval: validated.refresh_interval(),
        filters: validated.label_filters(),
    })
}
