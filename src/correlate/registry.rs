//! Host-framework adapter registry.
//!
//! Adapters bridge a framework's callback hooks to the correlator. Instead of
//! probing for the host at use time, each adapter declares a capability probe
//! that runs up front and yields a typed availability result, and attaching an
//! unavailable adapter fails with actionable remediation text.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::trace::Tracer;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter's host framework is not present in this process.
    #[error("adapter {adapter:?} requires a host framework that is unavailable: {remediation}")]
    MissingDependency {
        adapter: &'static str,
        remediation: String,
    },

    #[error("no adapter registered under {0:?}")]
    UnknownAdapter(String),
}

/// Result of an adapter's capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterAvailability {
    Available,
    Unavailable { reason: String },
}

/// One supported host framework.
///
/// `attach` wires the framework's before/after hooks to the tracer's
/// correlator and registers any lifecycle observers the adapter needs; it
/// must be idempotent, which the registry enforces by name.
pub trait HostAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Detect whether the host framework is usable in this process.
    fn probe(&self) -> AdapterAvailability;

    fn attach(&self, tracer: &Tracer) -> Result<(), AdapterError>;
}

/// Registry of known adapters with idempotent attachment.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Mutex<Vec<Arc<dyn HostAdapter>>>,
    attached: Mutex<HashSet<&'static str>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn HostAdapter>) {
        let mut adapters = self.adapters.lock();
        if adapters.iter().any(|a| a.name() == adapter.name()) {
            tracing::debug!(name = adapter.name(), "Adapter already registered");
            return;
        }
        adapters.push(adapter);
    }

    /// Probe and attach one adapter by name. A second attach of the same
    /// adapter is a no-op; an unavailable host is a typed error carrying the
    /// probe's remediation text.
    pub fn attach(&self, name: &str, tracer: &Tracer) -> Result<(), AdapterError> {
        let adapter = {
            let adapters = self.adapters.lock();
            adapters
                .iter()
                .find(|a| a.name() == name)
                .cloned()
                .ok_or_else(|| AdapterError::UnknownAdapter(name.to_string()))?
        };
        if !self.attached.lock().insert(adapter.name()) {
            return Ok(());
        }
        if let AdapterAvailability::Unavailable { reason } = adapter.probe() {
            self.attached.lock().remove(adapter.name());
            return Err(AdapterError::MissingDependency {
                adapter: adapter.name(),
                remediation: reason,
            });
        }
        adapter.attach(tracer).inspect_err(|_| {
            self.attached.lock().remove(adapter.name());
        })
    }

    /// Probe every registered adapter without attaching.
    pub fn availability(&self) -> Vec<(&'static str, AdapterAvailability)> {
        self.adapters
            .lock()
            .iter()
            .map(|a| (a.name(), a.probe()))
            .collect()
    }
}
