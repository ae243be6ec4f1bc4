// =============================================================================
// Command Shell State
// =============================================================================
//
// Everything the REST command shell needs, shared via `Arc<ShellState>`.
// The shell never touches the window or RSI engine: it reads the snapshot the
// ingestor publishes and dispatches test alerts through the same dispatcher
// the live path uses.
// =============================================================================

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::alerts::{AlertDispatcher, AlertPolicy};
use crate::ingestor::IndicatorSnapshot;

pub struct ShellState {
    snapshot: watch::Receiver<IndicatorSnapshot>,
    pub policy: AlertPolicy,
    pub dispatcher: AlertDispatcher,
    /// Gate for synthetic alerts. Off at startup.
    test_mode: RwLock<bool>,
    /// Instant when the sentinel was started. Used for uptime.
    pub start_time: std::time::Instant,
}

impl ShellState {
    pub fn new(
        snapshot: watch::Receiver<IndicatorSnapshot>,
        policy: AlertPolicy,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            snapshot,
            policy,
            dispatcher,
            test_mode: RwLock::new(false),
            start_time: std::time::Instant::now(),
        }
    }

    /// Latest published indicator state.
    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn test_mode(&self) -> bool {
        *self.test_mode.read()
    }

    pub fn set_test_mode(&self, enabled: bool) {
        *self.test_mode.write() = enabled;
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
