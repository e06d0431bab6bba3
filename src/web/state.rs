//! Shared state for the viewer server.

use std::sync::Arc;

use crate::storage::RunStore;

/// State handed to every handler: the run store, read-only.
#[derive(Clone)]
pub struct WebAppState {
    store: Arc<RunStore>,
}

impl WebAppState {
    pub fn new(store: RunStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }
}
