pub mod config;
pub mod correlate;
pub mod events;
pub mod storage;
pub mod trace;
pub mod util;
pub mod web;

pub use config::Settings;
pub use correlate::{
    AdapterAvailability, AdapterError, AdapterRegistry, CallCorrelator, CallSite, HostAdapter,
};
pub use events::{
    Counts, ErrorInfo, Event, EventType, RunStatus, RunSummary, DEPTH_LIMIT, REDACTED_MARKER,
    SPEC_VERSION, TRUNCATED_MARKER,
};
pub use storage::{new_run_id, RunStore, StorageError};
pub use trace::{
    CallStatus, HookOutcome, LlmCall, RunHandle, RunObserver, RunOutcome, ToolCall, Tracer,
};
pub use web::{run_server, ServerConfig, WebAppState};
