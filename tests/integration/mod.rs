//! Integration test modules.

pub mod api_flow;
pub mod correlator_flow;
pub mod tracing_flow;

use agentdbg::{Settings, Tracer};
use tempfile::TempDir;

/// A tracer writing into an isolated temp data dir.
pub fn temp_tracer() -> (Tracer, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut settings = Settings::default();
    settings.data_dir = dir.path().to_path_buf();
    (Tracer::new(settings), dir)
}
