use tokio::sync::watch;

/// Cancels every associated `ShutdownSignal`. Dropping it has the same effect.
pub(crate) struct Trigger {
    tx: watch::Sender<bool>,
}

impl Trigger {
    pub(crate) fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone)]
pub(crate) struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once the trigger is cancelled or dropped, and keeps resolving
    /// immediately afterwards.
    pub(crate) async fn wait(&mut self) {
        // Err means the trigger is gone, which counts as shutdown as well
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

pub(crate) fn pair() -> (Trigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);

    (Trigger { tx }, ShutdownSignal { rx })
}
