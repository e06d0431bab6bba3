//! Path helpers for AgentDbg data directories.

use std::path::PathBuf;

/// Default data directory (`~/.agentdbg`), falling back to a relative
/// `.agentdbg` when no home directory is available.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".agentdbg"))
        .unwrap_or_else(|| PathBuf::from(".agentdbg"))
}
