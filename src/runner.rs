use discovery::{Component, Snapshot, Status, UpdateError, file, static_config};
use discovery::file::FileArguments;
use discovery::static_config::StaticArguments;
use tokio::sync::watch;

use crate::config::DiscoveryConfig;

/// The running component of whichever backend is configured.
pub enum Runner {
    File(Component<FileArguments>),
    Static(Component<StaticArguments>),
}

impl Runner {
    pub async fn start(config: DiscoveryConfig) -> Result<Self, UpdateError> {
        match config {
            DiscoveryConfig::File(arguments) => Component::new(arguments, file::build)
                .await
                .map(Runner::File),
            DiscoveryConfig::Static(arguments) => Component::new(arguments, static_config::build)
                .await
                .map(Runner::Static),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Runner::File(_) => "file",
            Runner::Static(_) => "static",
        }
    }

    /// A receiver that also yields the snapshot already published, a poll
    /// that finished before subscribing would be missed otherwise.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        let mut rx = match self {
            Runner::File(component) => component.subscribe(),
            Runner::Static(component) => component.subscribe(),
        };

        // subscribed first, so a publish after this check still notifies
        if self.status().last_success.is_some() {
            rx.mark_changed();
        }

        rx
    }

    pub fn status(&self) -> Status {
        match self {
            Runner::File(component) => component.status(),
            Runner::Static(component) => component.status(),
        }
    }

    /// Apply a reloaded config. The same backend is updated in place, a
    /// different one is started first and only then replaces the running one.
    /// Returns whether the component was replaced, which means subscribers
    /// have to subscribe again.
    pub async fn reload(&mut self, config: DiscoveryConfig) -> Result<bool, UpdateError> {
        let config = match (&*self, config) {
            (Runner::File(component), DiscoveryConfig::File(arguments)) => {
                return component.update(arguments).await.map(|()| false);
            }
            (Runner::Static(component), DiscoveryConfig::Static(arguments)) => {
                return component.update(arguments).await.map(|()| false);
            }
            (_, config) => config,
        };

        let replacement = Runner::start(config).await?;
        let previous = std::mem::replace(self, replacement);
        info!(
            message = "discovery backend replaced",
            from = previous.kind(),
            to = self.kind()
        );
        previous.shutdown().await;

        Ok(true)
    }

    pub async fn shutdown(self) {
        match self {
            Runner::File(component) => component.shutdown().await,
            Runner::Static(component) => component.shutdown().await,
        }
    }
}
