use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout};

use crate::error::PollError;
use crate::shutdown::ShutdownSignal;
use crate::state::{Phase, Shared};

/// Each poll gets nine tenths of the refresh interval, so a hung backend can
/// never starve the next tick.
pub(crate) fn poll_timeout(interval: Duration) -> Duration {
    interval - interval / 10
}

/// `run` polls the active discoverer until shutdown. The first poll happens
/// right away, following ones every `refresh_interval`. The interval is read
/// again after each poll, so a reconfigured interval applies from the next
/// scheduled tick on.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: ShutdownSignal) {
    let mut next = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => break,
            _ = sleep_until(next) => {}
        }

        let active = shared.active();
        let limit = poll_timeout(active.refresh_interval);

        shared.set_phase(Phase::Polling);
        let result = tokio::select! {
            biased;

            // dropping the in-flight call is how it gets cancelled
            _ = shutdown.wait() => break,
            result = timeout(limit, active.discoverer.targets()) => result,
        };

        match result {
            Ok(Ok(groups)) => shared.publish(groups),
            Ok(Err(err)) => {
                warn!(message = "error while discovering targets", %err);

                shared.fail(PollError::Discover(err));
            }
            Err(_elapsed) => {
                warn!(message = "discovering targets timed out", timeout = ?limit);

                shared.fail(PollError::Timeout(limit));
            }
        }

        next = next_tick(next, shared.refresh_interval());
    }

    shared.set_phase(Phase::Stopped);
}

/// The tick after `previous`. An interval shortened while polling could
/// schedule it in the past, poll right away then. An interval too large for
/// the clock parks the loop until shutdown or the next reconfigured tick.
fn next_tick(previous: Instant, interval: Duration) -> Instant {
    let now = Instant::now();

    match previous.checked_add(interval) {
        Some(next) => next.max(now),
        None => far_future(now),
    }
}

// roughly 30 years, the same horizon tokio uses for timers that never fire
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}
