use std::pin::pin;

use futures::{Stream, StreamExt};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;

pub type SignalTx = mpsc::Sender<SignalTo>;
pub type SignalRx = mpsc::Receiver<SignalTo>;

/// Control messages driving reloads and shutdown.
#[derive(Debug, Eq, PartialEq)]
pub enum SignalTo {
    /// Signal to reload config from the filesystem
    ReloadFromDisk,
    /// Signal to shutdown process
    Shutdown,
    /// Shutdown process immediately
    Quit,
}

/// SignalHandler forwards control messages from any number of streams to
/// one receiver.
pub struct SignalHandler {
    tx: SignalTx,
}

impl SignalHandler {
    /// Space for 2 control messages at a time, so senders rarely block.
    pub fn new() -> (Self, SignalRx) {
        let (tx, rx) = mpsc::channel(2);

        (Self { tx }, rx)
    }

    /// Spawn a task forwarding everything `stream` yields until the receiver
    /// goes away.
    pub fn forever<S>(&mut self, stream: S)
    where
        S: Stream<Item = SignalTo> + Send + 'static,
    {
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let mut stream = pin!(stream);

            while let Some(value) = stream.next().await {
                if tx.send(value).await.is_err() {
                    debug!(message = "signal receiver is gone");
                    break;
                }
            }
        });
    }
}

struct Signals {
    sigint: Signal,
    sigterm: Signal,
    sigquit: Signal,
    sighup: Signal,
}

/// Signals from OS/user, SIGHUP reloads, SIGINT and SIGTERM shut down
/// gracefully, SIGQUIT quits.
pub fn os_signals() -> std::io::Result<impl Stream<Item = SignalTo> + Send + 'static> {
    let signals = Signals {
        sigint: signal(SignalKind::interrupt())?,
        sigterm: signal(SignalKind::terminate())?,
        sigquit: signal(SignalKind::quit())?,
        sighup: signal(SignalKind::hangup())?,
    };

    Ok(futures::stream::unfold(signals, |mut signals| async move {
        let (name, to) = tokio::select! {
            Some(()) = signals.sigint.recv() => ("SIGINT", SignalTo::Shutdown),
            Some(()) = signals.sigterm.recv() => ("SIGTERM", SignalTo::Shutdown),
            Some(()) = signals.sigquit.recv() => ("SIGQUIT", SignalTo::Quit),
            Some(()) = signals.sighup.recv() => ("SIGHUP", SignalTo::ReloadFromDisk),
            else => return None,
        };

        info!(message = "signal received", signal = name);

        Some((to, signals))
    }))
}
