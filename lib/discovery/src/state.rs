use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use crate::discoverer::Discoverer;
use crate::error::PollError;
use crate::filter::{self, Filter};
use crate::target::TargetGroup;

/// An internally consistent set of target groups, cheap to clone and compare
/// with `Arc::ptr_eq`.
pub type Snapshot = Arc<Vec<TargetGroup>>;

/// Where the refresh loop currently is. `Idle` is only seen before the first
/// poll, between ticks the outcome of the last poll is kept.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Polling,
    Published,
    Failed,
    Stopped,
}

/// A point in time view of a component, for health reporting.
#[derive(Clone, Debug)]
pub struct Status {
    pub phase: Phase,
    pub refresh_interval: Duration,
    pub last_success: Option<SystemTime>,
    pub last_error: Option<Arc<PollError>>,
}

/// Everything the refresh loop needs for one tick. Replaced as a whole on
/// reconfiguration, so a tick never sees a new interval with an old discoverer.
pub(crate) struct Active {
    pub discoverer: Arc<dyn Discoverer>,
    pub refresh_interval: Duration,
    pub filters: Vec<Filter>,
}

struct DiscoveryState {
    active: Arc<Active>,
    snapshot: Snapshot,
    phase: Phase,
    last_success: Option<SystemTime>,
    last_error: Option<Arc<PollError>>,
}

/// Owns the `DiscoveryState` of one component. The state is only touched while
/// holding `state`, and the exported snapshot is swapped inside the same
/// critical section, so readers see either the old or the new set, never a mix.
pub(crate) struct Shared {
    state: Mutex<DiscoveryState>,
    exported: watch::Sender<Snapshot>,
}

impl Shared {
    pub(crate) fn new(active: Active) -> Self {
        let empty = Snapshot::default();
        let (exported, _) = watch::channel(Arc::clone(&empty));

        Self {
            state: Mutex::new(DiscoveryState {
                active: Arc::new(active),
                snapshot: empty,
                phase: Phase::Idle,
                last_success: None,
                last_error: None,
            }),
            exported,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DiscoveryState> {
        // every critical section leaves the state consistent
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn active(&self) -> Arc<Active> {
        Arc::clone(&self.lock().active)
    }

    pub(crate) fn refresh_interval(&self) -> Duration {
        self.lock().active.refresh_interval
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }

    /// Replace the snapshot with the result of a successful poll.
    pub(crate) fn publish(&self, groups: Vec<TargetGroup>) {
        let mut state = self.lock();

        let snapshot = Arc::new(groups);
        let exported = narrow(&state.active.filters, &snapshot);

        state.snapshot = snapshot;
        state.phase = Phase::Published;
        state.last_success = Some(SystemTime::now());
        state.last_error = None;

        self.exported.send_replace(exported);
    }

    /// Record a failed poll, the snapshot stays as it is.
    pub(crate) fn fail(&self, err: PollError) {
        let mut state = self.lock();

        state.phase = Phase::Failed;
        state.last_error = Some(Arc::new(err));
    }

    /// Swap in a new active configuration. When the label filters change the
    /// current snapshot is narrowed again right away, the next poll is not
    /// needed for that.
    pub(crate) fn swap(&self, active: Active) {
        let mut state = self.lock();

        let refilter = state.active.filters != active.filters;
        state.active = Arc::new(active);

        if refilter {
            let exported = narrow(&state.active.filters, &state.snapshot);
            self.exported.send_replace(exported);
        }
    }

    pub(crate) fn export(&self) -> Snapshot {
        self.exported.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.exported.subscribe()
    }

    pub(crate) fn status(&self) -> Status {
        let state = self.lock();

        Status {
            phase: state.phase,
            refresh_interval: state.active.refresh_interval,
            last_success: state.last_success,
            last_error: state.last_error.clone(),
        }
    }
}

fn narrow(filters: &[Filter], snapshot: &Snapshot) -> Snapshot {
    if filters.is_empty() {
        return Arc::clone(snapshot);
    }

    Arc::new(filter::apply(filters, snapshot))
}
