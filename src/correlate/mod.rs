//! Before/after call correlation for callback-driven host frameworks.
//!
//! Host adapters see an operation twice: a "before" hook with the inputs and
//! an "after" hook with the outputs, possibly interleaved across concurrent
//! or nested operations. [`CallCorrelator`] pairs the two signals:
//!
//! - LLM calls match LIFO per call site, so a call triggered from within
//!   another pairs the after-signal with the most recent before-signal;
//! - tool calls match FIFO per tool name, so concurrent same-name calls pair
//!   in arrival order.
//!
//! Entries with no matching after-signal by run end (a short-circuiting
//! earlier hook, an exception, early termination) are flushed as synthetic
//! error events so no started call ever disappears from the trace.

pub mod registry;

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::events::ErrorInfo;
use crate::trace::{CallStatus, HookOutcome, LlmCall, RunObserver, ToolCall, Tracer};

pub use registry::{AdapterAvailability, AdapterError, AdapterRegistry, HostAdapter};

/// Meta marker placed on synthetic events flushed at run end.
pub const COMPLETION_MISSING_AFTER_HOOK: &str = "missing_after_hook";

/// Identity of a logically independent LLM call site: a scope (for example an
/// executor's pointer identity) plus its iteration counter. Concurrent
/// operations with distinct sites never cross-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub scope: u64,
    pub iteration: u64,
}

impl CallSite {
    pub fn new(scope: u64, iteration: u64) -> Self {
        Self { scope, iteration }
    }
}

#[derive(Debug)]
struct PendingLlm {
    started: Instant,
    model: String,
    prompt: Value,
    meta: Value,
}

#[derive(Debug)]
struct PendingTool {
    started: Instant,
    args: Value,
    meta: Value,
}

/// The pairing engine. All state is keyed by run id and cleared when the run
/// exits, so pending calls never outlive their run.
#[derive(Default)]
pub struct CallCorrelator {
    llm: Mutex<HashMap<(String, CallSite), Vec<PendingLlm>>>,
    tool: Mutex<HashMap<(String, String), VecDeque<PendingTool>>>,
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Before-signal for an LLM call: snapshot the inputs and push onto the
    /// call site's stack. No-op without an active run.
    pub fn before_llm_call(
        &self,
        tracer: &Tracer,
        site: CallSite,
        model: &str,
        prompt: Value,
        meta: Value,
    ) -> HookOutcome {
        let Some(run_id) = tracer.current_run_id() else {
            return HookOutcome::Skipped;
        };
        self.llm
            .lock()
            .entry((run_id, site))
            .or_default()
            .push(PendingLlm {
                started: Instant::now(),
                model: model.to_string(),
                prompt,
                meta,
            });
        HookOutcome::Recorded
    }

    /// After-signal for an LLM call: pop the most recent before-signal for
    /// this site and emit the completed event.
    pub fn after_llm_call(&self, tracer: &Tracer, site: CallSite, response: Value) -> HookOutcome {
        let Some(run_id) = tracer.current_run_id() else {
            return HookOutcome::Skipped;
        };
        let pending = {
            let mut llm = self.llm.lock();
            let Some(stack) = llm.get_mut(&(run_id, site)) else {
                return HookOutcome::Skipped;
            };
            stack.pop()
        };
        let Some(pending) = pending else {
            return HookOutcome::Skipped;
        };
        let duration_ms = elapsed_ms(pending.started);
        tracer.record_llm_call(LlmCall {
            model: pending.model,
            prompt: pending.prompt,
            response,
            meta: with_duration(pending.meta, duration_ms),
            ..LlmCall::default()
        })
    }

    /// Before-signal for a tool call: snapshot the inputs and enqueue under
    /// the tool's name. No-op without an active run.
    pub fn before_tool_call(
        &self,
        tracer: &Tracer,
        name: &str,
        args: Value,
        meta: Value,
    ) -> HookOutcome {
        let Some(run_id) = tracer.current_run_id() else {
            return HookOutcome::Skipped;
        };
        self.tool
            .lock()
            .entry((run_id, name.to_string()))
            .or_default()
            .push_back(PendingTool {
                started: Instant::now(),
                args,
                meta,
            });
        HookOutcome::Recorded
    }

    /// After-signal for a tool call: dequeue the oldest before-signal for
    /// this name and emit the completed event.
    pub fn after_tool_call(&self, tracer: &Tracer, name: &str, result: Value) -> HookOutcome {
        let Some(run_id) = tracer.current_run_id() else {
            return HookOutcome::Skipped;
        };
        let pending = {
            let mut tool = self.tool.lock();
            let Some(queue) = tool.get_mut(&(run_id, name.to_string())) else {
                return HookOutcome::Skipped;
            };
            queue.pop_front()
        };
        let Some(pending) = pending else {
            return HookOutcome::Skipped;
        };
        let duration_ms = elapsed_ms(pending.started);
        tracer.record_tool_call(ToolCall {
            name: name.to_string(),
            args: pending.args,
            result,
            meta: with_duration(pending.meta, duration_ms),
            ..ToolCall::default()
        })
    }

    /// Number of pending entries for a run, across both disciplines.
    pub fn pending_for_run(&self, run_id: &str) -> usize {
        let llm: usize = self
            .llm
            .lock()
            .iter()
            .filter(|((rid, _), _)| rid == run_id)
            .map(|(_, stack)| stack.len())
            .sum();
        let tool: usize = self
            .tool
            .lock()
            .iter()
            .filter(|((rid, _), _)| rid == run_id)
            .map(|(_, queue)| queue.len())
            .sum();
        llm + tool
    }

    /// Emit one synthetic error event per still-pending call and clear all
    /// state for the run. When the run ended via an error, that error rides
    /// along as the synthetic event's error payload.
    fn flush_run(&self, tracer: &Tracer, run_id: &str, error: Option<&ErrorInfo>) {
        let error = error.cloned().unwrap_or_else(|| {
            ErrorInfo::new("IncompleteCall", "Missing after_hook")
        });

        let flushed_llm: Vec<PendingLlm> = {
            let mut llm = self.llm.lock();
            let keys: Vec<_> = llm
                .keys()
                .filter(|(rid, _)| rid == run_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| llm.remove(&key))
                .flatten()
                .collect()
        };
        for pending in flushed_llm {
            let duration_ms = elapsed_ms(pending.started);
            tracer.record_llm_call(LlmCall {
                model: pending.model,
                prompt: pending.prompt,
                response: Value::Null,
                status: CallStatus::Error,
                error: Some(error.clone()),
                meta: with_completion(pending.meta, duration_ms),
                ..LlmCall::default()
            });
        }

        let flushed_tool: Vec<(String, PendingTool)> = {
            let mut tool = self.tool.lock();
            let keys: Vec<_> = tool
                .keys()
                .filter(|(rid, _)| rid == run_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| tool.remove(&key).map(|queue| (key.1, queue)))
                .flat_map(|(name, queue)| queue.into_iter().map(move |p| (name.clone(), p)))
                .collect()
        };
        for (name, pending) in flushed_tool {
            let duration_ms = elapsed_ms(pending.started);
            tracer.record_tool_call(ToolCall {
                name,
                args: pending.args,
                result: Value::Null,
                status: CallStatus::Error,
                error: Some(error.clone()),
                meta: with_completion(pending.meta, duration_ms),
                ..ToolCall::default()
            });
        }
    }
}

impl RunObserver for CallCorrelator {
    fn name(&self) -> &'static str {
        "call_correlator"
    }

    fn on_run_exit(&self, tracer: &Tracer, run_id: &str, error: Option<&ErrorInfo>) {
        self.flush_run(tracer, run_id, error);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn with_duration(meta: Value, duration_ms: u64) -> Value {
    match meta {
        Value::Object(mut map) => {
            map.insert("duration_ms".to_string(), json!(duration_ms));
            Value::Object(map)
        }
        Value::Null => json!({ "duration_ms": duration_ms }),
        other => json!({ "duration_ms": duration_ms, "adapter": other }),
    }
}

fn with_completion(meta: Value, duration_ms: u64) -> Value {
    match with_duration(meta, duration_ms) {
        Value::Object(mut map) => {
            map.insert(
                "completion".to_string(),
                Value::String(COMPLETION_MISSING_AFTER_HOOK.to_string()),
            );
            Value::Object(map)
        }
        other => other,
    }
}
