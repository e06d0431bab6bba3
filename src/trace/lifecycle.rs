//! Run-lifecycle observer registry.
//!
//! Adapters (the call correlator included) attach here to learn when runs
//! start and end. Registration is idempotent by observer name, so activating
//! an integration twice never doubles its callbacks.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::ErrorInfo;

use super::Tracer;

/// Facts about a run handed to observers when it starts.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    /// True when the run was auto-created by the implicit-run fallback.
    pub implicit: bool,
}

/// Hooks into the run lifecycle. Implementations must not block and must not
/// panic; they are invoked outside the tracer's locks.
pub trait RunObserver: Send + Sync {
    /// Stable identity used to deduplicate repeated registration.
    fn name(&self) -> &'static str;

    fn on_run_enter(&self, _tracer: &Tracer, _run: &RunInfo) {}

    /// Called while the run is still active, before RUN_END is written, so
    /// observers may still record events against it. `error` carries the
    /// run's terminal error when it ended via one.
    fn on_run_exit(&self, _tracer: &Tracer, _run_id: &str, _error: Option<&ErrorInfo>) {}
}

/// Registry of lifecycle observers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn RunObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. A second registration under the same name is
    /// ignored.
    pub fn register(&self, observer: Arc<dyn RunObserver>) {
        let mut observers = self.observers.lock();
        if observers.iter().any(|o| o.name() == observer.name()) {
            tracing::debug!(name = observer.name(), "Observer already registered");
            return;
        }
        observers.push(observer);
    }

    pub(super) fn notify_enter(&self, tracer: &Tracer, run: &RunInfo) {
        for observer in self.snapshot() {
            observer.on_run_enter(tracer, run);
        }
    }

    pub(super) fn notify_exit(&self, tracer: &Tracer, run_id: &str, error: Option<&ErrorInfo>) {
        for observer in self.snapshot() {
            observer.on_run_exit(tracer, run_id, error);
        }
    }

    // Callbacks run on the clone so no lock is held across observer code.
    fn snapshot(&self) -> Vec<Arc<dyn RunObserver>> {
        self.observers.lock().clone()
    }
}
