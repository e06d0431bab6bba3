//! Run lifecycle and the recording API.
//!
//! [`Tracer`] is an explicit context object: it owns the settings, the run
//! store, the single active-run slot, the lifecycle observer registry, and
//! the call correlator. Instrumented code records through it; internal
//! failures (sanitize, storage, correlation) are absorbed and logged, never
//! surfaced to the caller. The only error that crosses the boundary is the
//! traced code's own, which is recorded and then returned unchanged.

pub mod lifecycle;
pub mod loop_detect;

use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::correlate::CallCorrelator;
use crate::events::{
    sanitize, sanitize_argv, to_value_lossy, Counts, ErrorInfo, Event, EventType, RunStatus,
    RunSummary, SPEC_VERSION,
};
use crate::storage::{new_run_id, EventLog, RunStore, StorageError};

pub use lifecycle::{ObserverRegistry, RunInfo, RunObserver};
pub use loop_detect::{call_signature, LoopDetector};

/// Run name used by the implicit-run fallback.
pub const IMPLICIT_RUN_NAME: &str = "implicit";

/// Explicit outcome of a recording or hook handler.
///
/// Handlers never raise into the host; a failure inside the instrumentation
/// is logged and reported as `Absorbed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The signal was accepted: an event was persisted, or a pending entry
    /// was enqueued for later pairing.
    Recorded,
    /// Nothing to do (no active run, or no matching pending call).
    Skipped,
    /// An internal failure occurred and was swallowed.
    Absorbed,
}

impl HookOutcome {
    pub fn is_recorded(self) -> bool {
        matches!(self, HookOutcome::Recorded)
    }
}

/// Completion status stored in call payloads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Ok,
    Error,
}

/// Parameters for [`Tracer::record_llm_call`].
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub model: String,
    pub provider: String,
    pub prompt: Value,
    pub response: Value,
    pub usage: Option<Value>,
    pub status: CallStatus,
    pub error: Option<ErrorInfo>,
    pub meta: Value,
}

impl Default for LlmCall {
    fn default() -> Self {
        Self {
            model: "unknown".to_string(),
            provider: "unknown".to_string(),
            prompt: Value::Null,
            response: Value::Null,
            usage: None,
            status: CallStatus::Ok,
            error: None,
            meta: json!({}),
        }
    }
}

/// Parameters for [`Tracer::record_tool_call`].
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    pub result: Value,
    pub status: CallStatus,
    pub error: Option<ErrorInfo>,
    pub meta: Value,
}

impl Default for ToolCall {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            args: Value::Null,
            result: Value::Null,
            status: CallStatus::Ok,
            error: None,
            meta: json!({}),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Ok,
    Error(ErrorInfo),
}

/// Lightweight reference to a begun run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// Per-run mutable state. One mutex guards the sequence counter, the counts,
/// the log writer, and the loop detector together, so `seq` values, counts,
/// and the line stream stay consistent under concurrent recorders.
struct RunState {
    seq: u64,
    counts: Counts,
    log: EventLog,
    detector: LoopDetector,
    /// Set while `end_run` is in flight; blocks a second finalization but
    /// still admits appends (the correlator flush records during this window).
    ending: bool,
    /// Set once RUN_END is written; no event may follow it.
    ended: bool,
}

struct ActiveRun {
    run_id: String,
    run_name: String,
    started_at: DateTime<Utc>,
    implicit: bool,
    state: Mutex<RunState>,
}

/// The tracing context. See the module docs for the ownership model.
///
/// Process-exit finalization of an implicit run is carried by the owner's
/// scope: [`Tracer::shutdown`] is idempotent and also runs on `Drop`, so an
/// implicit run always gets its RUN_END when the tracer goes away, even if
/// `end_run` already fired.
pub struct Tracer {
    settings: Settings,
    store: RunStore,
    active: Mutex<Option<Arc<ActiveRun>>>,
    observers: ObserverRegistry,
    correlator: Arc<CallCorrelator>,
}

impl Tracer {
    pub fn new(settings: Settings) -> Self {
        let store = RunStore::new(settings.data_dir.clone());
        let correlator = Arc::new(CallCorrelator::new());
        let observers = ObserverRegistry::new();
        observers.register(correlator.clone());
        Self {
            settings,
            store,
            active: Mutex::new(None),
            observers,
            correlator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// The before/after call-pairing engine, for adapters to feed.
    pub fn correlator(&self) -> &Arc<CallCorrelator> {
        &self.correlator
    }

    /// Register a lifecycle observer (idempotent by name).
    pub fn register_observer(&self, observer: Arc<dyn RunObserver>) {
        self.observers.register(observer);
    }

    /// The currently active run id, if any. Never creates an implicit run.
    pub fn current_run_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|r| r.run_id.clone())
    }

    /// Begin a run and install it as the active run.
    ///
    /// Only one run may be active at a time: a nested `begin_run` while one
    /// is active returns a handle to the existing run. Writes RUN_START
    /// synchronously. Internal failures are absorbed; the returned handle
    /// then refers to a run that was never installed.
    pub fn begin_run(&self, name: &str, meta: Value) -> RunHandle {
        let run_id = new_run_id();
        {
            let mut active = self.active.lock();
            if let Some(existing) = active.as_ref() {
                tracing::debug!(
                    active = %existing.run_id,
                    rejected = name,
                    "begin_run while a run is active; reusing the active run"
                );
                return RunHandle {
                    run_id: existing.run_id.clone(),
                };
            }
            match self.create_run(run_id.clone(), name, meta, false) {
                Ok(run) => *active = Some(run),
                Err(e) => {
                    tracing::error!(run_id, error = %e, "Failed to begin run");
                    return RunHandle { run_id };
                }
            }
        }
        self.notify_enter_for(&run_id);
        RunHandle { run_id }
    }

    /// Finish the active run: record its terminal error (if any), let
    /// observers flush, write RUN_END, persist the final summary, and clear
    /// the active slot. Idempotent per run.
    pub fn end_run(&self, outcome: RunOutcome) {
        let Some(run) = self.active.lock().clone() else {
            tracing::debug!("end_run with no active run");
            return;
        };
        {
            let mut state = run.state.lock();
            if state.ended {
                drop(state);
                self.clear_active(&run.run_id);
                return;
            }
            // The finalization in flight owns the active slot; observers may
            // still be recording flush events against it.
            if state.ending {
                return;
            }
            state.ending = true;
        }

        let error = match &outcome {
            RunOutcome::Error(info) => Some(info.clone()),
            RunOutcome::Ok => None,
        };

        if let Some(info) = &error {
            let payload = sanitize(
                &json!({
                    "error_type": info.error_type,
                    "message": info.message,
                    "stack": info.stack,
                }),
                &self.settings,
            );
            let mut state = run.state.lock();
            if let Err(e) = Self::append_locked(&mut state, EventType::Error, payload, json!({})) {
                tracing::debug!(run_id = %run.run_id, error = %e, "Failed to record run error");
            }
        }

        // Flush correlator state (and any other observers) while the run is
        // still active, so synthetic events land before RUN_END.
        self.observers.notify_exit(self, &run.run_id, error.as_ref());

        let ended_at = Utc::now();
        let counts = {
            let mut state = run.state.lock();
            let duration_ms = (ended_at - run.started_at).num_milliseconds().max(0);
            let payload = json!({ "duration_ms": duration_ms, "counts": state.counts });
            if let Err(e) = Self::append_locked(&mut state, EventType::RunEnd, payload, json!({})) {
                tracing::debug!(run_id = %run.run_id, error = %e, "Failed to record RUN_END");
            }
            state.ended = true;
            state.counts
        };

        let summary = RunSummary {
            spec_version: SPEC_VERSION.to_string(),
            run_id: run.run_id.clone(),
            run_name: run.run_name.clone(),
            status: if error.is_some() {
                RunStatus::Error
            } else {
                RunStatus::Ok
            },
            started_at: run.started_at,
            ended_at: Some(ended_at),
            counts,
        };
        if let Err(e) = self.store.write_summary(&summary) {
            tracing::error!(run_id = %run.run_id, error = %e, "Failed to persist run summary");
        }

        self.clear_active(&run.run_id);
    }

    /// Run a closure inside a traced run.
    ///
    /// On `Err`, the error is recorded as an ERROR event and returned
    /// unchanged. A panic is recorded the same way and then resumed. The
    /// traced code's failure always crosses the boundary.
    pub fn trace<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error,
    {
        let _handle = self.begin_run(name, json!({}));
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => {
                self.end_run(RunOutcome::Ok);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.end_run(RunOutcome::Error(ErrorInfo::from_error(&e)));
                Err(e)
            }
            Err(panic) => {
                let info = ErrorInfo::new("panic", panic_message(panic.as_ref()));
                self.end_run(RunOutcome::Error(info));
                resume_unwind(panic)
            }
        }
    }

    /// Record an LLM call event.
    pub fn record_llm_call(&self, call: LlmCall) -> HookOutcome {
        let Some(run) = self.ensure_active() else {
            return HookOutcome::Skipped;
        };
        let signature = call_signature("llm", &call.model, &call.prompt);
        let payload = sanitize(
            &json!({
                "model": call.model,
                "provider": call.provider,
                "prompt": call.prompt,
                "response": call.response,
                "usage": call.usage,
                "status": call.status,
                "error": call.error,
            }),
            &self.settings,
        );
        let meta = sanitize(&call.meta, &self.settings);
        self.append_call(&run, EventType::LlmCall, payload, meta, signature)
    }

    /// Record a tool call event.
    pub fn record_tool_call(&self, call: ToolCall) -> HookOutcome {
        let Some(run) = self.ensure_active() else {
            return HookOutcome::Skipped;
        };
        let signature = call_signature("tool", &call.name, &call.args);
        let payload = sanitize(
            &json!({
                "name": call.name,
                "args": call.args,
                "result": call.result,
                "status": call.status,
                "error": call.error,
            }),
            &self.settings,
        );
        let meta = sanitize(&call.meta, &self.settings);
        self.append_call(&run, EventType::ToolCall, payload, meta, signature)
    }

    /// Record a state snapshot event. Accepts any serializable snapshot;
    /// values with no JSON form are stored as a descriptive string.
    pub fn record_state<S: Serialize>(&self, label: &str, state: S, meta: Value) -> HookOutcome {
        let Some(run) = self.ensure_active() else {
            return HookOutcome::Skipped;
        };
        let payload = sanitize(
            &json!({ "label": label, "state": to_value_lossy(&state) }),
            &self.settings,
        );
        let meta = sanitize(&meta, &self.settings);
        let mut run_state = run.state.lock();
        if run_state.ended {
            return HookOutcome::Skipped;
        }
        match Self::append_locked(&mut run_state, EventType::State, payload, meta) {
            Ok(()) => HookOutcome::Recorded,
            Err(e) => {
                tracing::debug!(run_id = %run.run_id, error = %e, "Failed to record state");
                HookOutcome::Absorbed
            }
        }
    }

    /// Finalize an implicit run still left active. Idempotent; also invoked
    /// from `Drop`, mirroring a process-exit hook for the owning scope.
    pub fn shutdown(&self) {
        let implicit = self
            .active
            .lock()
            .as_ref()
            .map(|r| r.implicit)
            .unwrap_or(false);
        if implicit {
            self.end_run(RunOutcome::Ok);
        }
    }

    fn create_run(
        &self,
        run_id: String,
        name: &str,
        meta: Value,
        implicit: bool,
    ) -> Result<Arc<ActiveRun>, StorageError> {
        let mut summary = RunSummary::new(run_id.clone(), name);
        summary.started_at = Utc::now();
        let log = self.store.create_run(&summary)?;

        let run = Arc::new(ActiveRun {
            run_id,
            run_name: name.to_string(),
            started_at: summary.started_at,
            implicit,
            state: Mutex::new(RunState {
                seq: 0,
                counts: Counts::default(),
                log,
                detector: LoopDetector::new(
                    self.settings.loop_window,
                    self.settings.loop_repetitions,
                ),
                ending: false,
                ended: false,
            }),
        });

        let argv: Vec<String> = std::env::args().collect();
        let payload = json!({
            "run_name": name,
            "argv": sanitize_argv(&argv, &self.settings),
            "meta": sanitize(&meta, &self.settings),
        });
        let mut state = run.state.lock();
        Self::append_locked(&mut state, EventType::RunStart, payload, json!({}))?;
        drop(state);
        Ok(run)
    }

    /// Resolve the active run, auto-creating the implicit run when enabled.
    fn ensure_active(&self) -> Option<Arc<ActiveRun>> {
        if let Some(run) = self.active.lock().clone() {
            return Some(run);
        }
        if !self.settings.implicit_run {
            tracing::debug!("Recording with no active run; implicit runs disabled");
            return None;
        }
        let run_id = new_run_id();
        {
            let mut active = self.active.lock();
            if let Some(run) = active.as_ref() {
                return Some(run.clone());
            }
            match self.create_run(run_id.clone(), IMPLICIT_RUN_NAME, json!({}), true) {
                Ok(run) => *active = Some(run),
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to create implicit run");
                    return None;
                }
            }
        }
        self.notify_enter_for(&run_id);
        self.active.lock().clone()
    }

    fn notify_enter_for(&self, run_id: &str) {
        let info = {
            let active = self.active.lock();
            active
                .as_ref()
                .filter(|r| r.run_id == run_id)
                .map(|r| RunInfo {
                    run_id: r.run_id.clone(),
                    run_name: r.run_name.clone(),
                    implicit: r.implicit,
                })
        };
        if let Some(info) = info {
            self.observers.notify_enter(self, &info);
        }
    }

    /// Append a call event and feed the loop detector under one lock, so the
    /// LOOP_WARNING (when it fires) lands immediately after its trigger.
    fn append_call(
        &self,
        run: &ActiveRun,
        event_type: EventType,
        payload: Value,
        meta: Value,
        signature: String,
    ) -> HookOutcome {
        let mut state = run.state.lock();
        if state.ended {
            return HookOutcome::Skipped;
        }
        if let Err(e) = Self::append_locked(&mut state, event_type, payload, meta) {
            tracing::debug!(run_id = %run.run_id, error = %e, "Failed to record call event");
            return HookOutcome::Absorbed;
        }
        if let Some(warning) = state.detector.observe(signature) {
            let payload = json!({
                "signature": warning.signature,
                "count": warning.count,
                "window": warning.window,
            });
            if let Err(e) =
                Self::append_locked(&mut state, EventType::LoopWarning, payload, json!({}))
            {
                tracing::debug!(run_id = %run.run_id, error = %e, "Failed to record loop warning");
            }
        }
        HookOutcome::Recorded
    }

    fn append_locked(
        state: &mut RunState,
        event_type: EventType,
        payload: Value,
        meta: Value,
    ) -> Result<(), StorageError> {
        let event = Event {
            event_type,
            seq: state.seq,
            timestamp: Utc::now(),
            payload,
            meta,
        };
        state.log.append(&event)?;
        state.seq += 1;
        match event_type {
            EventType::LlmCall => state.counts.llm_calls += 1,
            EventType::ToolCall => state.counts.tool_calls += 1,
            EventType::Error => state.counts.errors += 1,
            EventType::LoopWarning => state.counts.loop_warnings += 1,
            EventType::RunStart | EventType::RunEnd | EventType::State => {}
        }
        Ok(())
    }

    fn clear_active(&self, run_id: &str) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|r| r.run_id == run_id) {
            *active = None;
        }
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
