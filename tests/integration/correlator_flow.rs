//! Before/after correlation flows, including run-exit flushing.

use agentdbg::{CallSite, ErrorInfo, EventType, HookOutcome, RunOutcome};
use serde_json::json;

use super::temp_tracer;

#[test]
fn before_without_after_flushes_as_synthetic_error() {
    let (tracer, _dir) = temp_tracer();
    let correlator = tracer.correlator().clone();
    let handle = tracer.begin_run("crewai-run", json!({}));

    correlator.before_tool_call(&tracer, "search", json!({"q": "missing"}), json!({}));
    // The run dies before the after-hook ever fires.
    tracer.end_run(RunOutcome::Error(ErrorInfo::new(
        "RuntimeError",
        "kickoff failed",
    )));

    let events = tracer.store().load_events(handle.run_id()).unwrap();
    let tools: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::ToolCall)
        .collect();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].payload["status"], "error");
    assert_eq!(tools[0].payload["error"]["error_type"], "RuntimeError");
    assert_eq!(tools[0].payload["error"]["message"], "kickoff failed");
    assert_eq!(tools[0].meta["completion"], "missing_after_hook");

    // The run-level ERROR event is also present, and RUN_END closes the log.
    assert!(events.iter().any(|e| e.event_type == EventType::Error));
    assert_eq!(events.last().unwrap().event_type, EventType::RunEnd);
}

#[test]
fn overlapping_llm_and_tool_calls_correlate_independently() {
    let (tracer, _dir) = temp_tracer();
    let correlator = tracer.correlator().clone();
    let handle = tracer.begin_run("overlap", json!({}));

    let site = CallSite::new(42, 3);
    correlator.before_llm_call(&tracer, site, "gpt-4", json!("outer prompt"), json!({}));
    correlator.before_tool_call(&tracer, "lookup", json!({"k": 1}), json!({}));
    correlator.before_llm_call(&tracer, site, "gpt-4", json!("nested prompt"), json!({}));

    correlator.after_llm_call(&tracer, site, json!("nested answer"));
    correlator.after_tool_call(&tracer, "lookup", json!("looked up"));
    correlator.after_llm_call(&tracer, site, json!("outer answer"));
    tracer.end_run(RunOutcome::Ok);

    let events = tracer.store().load_events(handle.run_id()).unwrap();
    let llm: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::LlmCall)
        .collect();
    assert_eq!(llm.len(), 2);
    assert_eq!(llm[0].payload["prompt"], "nested prompt");
    assert_eq!(llm[0].payload["response"], "nested answer");
    assert_eq!(llm[1].payload["prompt"], "outer prompt");
    assert_eq!(llm[1].payload["response"], "outer answer");

    let tool = events
        .iter()
        .find(|e| e.event_type == EventType::ToolCall)
        .unwrap();
    assert_eq!(tool.payload["result"], "looked up");
    assert!(tool.meta["duration_ms"].is_u64());
}

#[test]
fn correlator_state_does_not_leak_across_runs() {
    let (tracer, _dir) = temp_tracer();
    let correlator = tracer.correlator().clone();

    let first = tracer.begin_run("first", json!({}));
    correlator.before_tool_call(&tracer, "search", json!({"q": "left over"}), json!({}));
    tracer.end_run(RunOutcome::Ok);
    assert_eq!(correlator.pending_for_run(first.run_id()), 0);

    let second = tracer.begin_run("second", json!({}));
    // An after-signal in the new run must not match the flushed entry.
    assert_eq!(
        correlator.after_tool_call(&tracer, "search", json!("stale")),
        HookOutcome::Skipped
    );
    tracer.end_run(RunOutcome::Ok);

    let events = tracer.store().load_events(second.run_id()).unwrap();
    assert!(!events.iter().any(|e| e.event_type == EventType::ToolCall));
}

#[test]
fn handlers_skip_cleanly_when_no_run_is_active() {
    let (tracer, _dir) = temp_tracer();
    let correlator = tracer.correlator().clone();

    assert_eq!(
        correlator.before_llm_call(&tracer, CallSite::new(1, 0), "m", json!({}), json!({})),
        HookOutcome::Skipped
    );
    assert_eq!(
        correlator.after_tool_call(&tracer, "search", json!({})),
        HookOutcome::Skipped
    );
    assert!(tracer.store().list_runs(10).unwrap().is_empty());
}
