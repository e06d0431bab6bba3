//! Event and run data model shared by the tracer, storage, and the web API.

pub mod codec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use codec::{sanitize, sanitize_argv, to_value_lossy};

/// Marker substituted for values whose key matches the sensitive set.
pub const REDACTED_MARKER: &str = "__REDACTED__";

/// Marker substituted for oversized or over-deep values.
pub const TRUNCATED_MARKER: &str = "__TRUNCATED__";

/// Schema version written into every run summary and API response.
pub const SPEC_VERSION: &str = "0.1";

/// Maximum nesting depth the sanitizer traverses before truncating a subtree.
/// Depth 0 is the payload root; a value at exactly this depth is still kept.
pub const DEPTH_LIMIT: usize = 20;

/// Kinds of events recorded within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStart,
    RunEnd,
    LlmCall,
    ToolCall,
    State,
    Error,
    LoopWarning,
}

/// Lifecycle status of a run. Transitions one-way: `Running` -> `Ok` | `Error`.
///
/// A run left at `Running` in storage means the process terminated before
/// finalization; consumers must treat it as possibly-incomplete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
}

/// Per-type event counters stored in the run summary.
///
/// Invariant: each field equals the number of persisted events of that type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub errors: u64,
    pub loop_warnings: u64,
}

/// The mutable run summary record (`run.json`), rewritten on each lifecycle
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub spec_version: String,
    pub run_id: String,
    pub run_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counts: Counts,
}

impl RunSummary {
    /// A fresh summary for a run that just started.
    pub fn new(run_id: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            spec_version: SPEC_VERSION.to_string(),
            run_id: run_id.into(),
            run_name: run_name.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            counts: Counts::default(),
        }
    }
}

/// One immutable record in a run's event log (`events.jsonl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    /// Monotonically increasing within a run, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub meta: Value,
}

/// Structured error details carried by ERROR events and synthetic flushed calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Build error details from any `Error`, using the unqualified type name.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short, err.to_string())
    }
}
