//! End-to-end tracing flows: lifecycle, redaction, counts, and concurrency.

use std::fmt;
use std::sync::Arc;

use agentdbg::{
    EventType, LlmCall, RunOutcome, RunStatus, Settings, ToolCall, Tracer, REDACTED_MARKER,
};
use serde_json::json;

use super::temp_tracer;

#[derive(Debug)]
struct TestFailure(&'static str);

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TestFailure {}

#[test]
fn successful_trace_produces_clean_run() {
    let (tracer, _dir) = temp_tracer();
    let result: Result<&str, TestFailure> = tracer.trace("happy-path", || Ok("done"));
    assert_eq!(result.unwrap(), "done");

    let runs = tracer.store().list_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Ok);
    assert_eq!(runs[0].counts.llm_calls, 0);
    assert_eq!(runs[0].counts.tool_calls, 0);
    assert_eq!(runs[0].counts.errors, 0);

    let events = tracer.store().load_events(&runs[0].run_id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::RunStart);
    assert_eq!(events[1].event_type, EventType::RunEnd);
}

#[test]
fn failing_trace_records_error_and_reraises() {
    let (tracer, _dir) = temp_tracer();
    let result: Result<(), TestFailure> =
        tracer.trace("sad-path", || Err(TestFailure("expected test failure")));
    assert_eq!(result.unwrap_err().to_string(), "expected test failure");

    let runs = tracer.store().list_runs(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::Error);
    assert_eq!(runs[0].counts.errors, 1);

    let events = tracer.store().load_events(&runs[0].run_id).unwrap();
    let errors: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["message"], "expected test failure");
}

#[test]
fn recorded_payloads_are_redacted_with_custom_keys() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.data_dir = dir.path().to_path_buf();
    settings.redact_keys = vec!["token".to_string()];
    let tracer = Tracer::new(settings);

    let result: Result<(), TestFailure> = tracer.trace("with-tool", || {
        tracer.record_tool_call(ToolCall {
            name: "my_tool".to_string(),
            args: json!({"token": "secret-api-key", "query": "hello"}),
            ..ToolCall::default()
        });
        Ok(())
    });
    result.unwrap();

    let runs = tracer.store().list_runs(1).unwrap();
    let events = tracer.store().load_events(&runs[0].run_id).unwrap();
    let tool = events
        .iter()
        .find(|e| e.event_type == EventType::ToolCall)
        .expect("tool call event");
    assert_eq!(tool.payload["args"]["token"], REDACTED_MARKER);
    assert_eq!(tool.payload["args"]["query"], "hello");
}

#[test]
fn concurrent_recorders_keep_seq_and_counts_consistent() {
    let (tracer, _dir) = temp_tracer();
    let tracer = Arc::new(tracer);
    let handle = tracer.begin_run("concurrent", json!({}));

    let mut workers = Vec::new();
    for t in 0..4 {
        let tracer = tracer.clone();
        workers.push(std::thread::spawn(move || {
            for i in 0..25 {
                tracer.record_tool_call(ToolCall {
                    name: format!("tool-{}", t),
                    args: json!({ "i": i }),
                    ..ToolCall::default()
                });
                tracer.record_llm_call(LlmCall {
                    model: format!("model-{}", t),
                    prompt: json!({ "i": i }),
                    ..LlmCall::default()
                });
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    tracer.end_run(RunOutcome::Ok);

    let summary = tracer.store().load_run_meta(handle.run_id()).unwrap();
    assert_eq!(summary.counts.tool_calls, 100);
    assert_eq!(summary.counts.llm_calls, 100);

    let events = tracer.store().load_events(handle.run_id()).unwrap();
    // Sequence numbers are contiguous and RUN_END is last.
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64);
    }
    assert_eq!(events.last().unwrap().event_type, EventType::RunEnd);
    let tool_events = events
        .iter()
        .filter(|e| e.event_type == EventType::ToolCall)
        .count() as u64;
    assert_eq!(tool_events, summary.counts.tool_calls);
}

#[test]
fn loop_warning_emitted_for_repetitive_behavior() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.data_dir = dir.path().to_path_buf();
    settings.loop_window = 4;
    settings.loop_repetitions = 2;
    let tracer = Tracer::new(settings);

    let handle = tracer.begin_run("looping", json!({}));
    for _ in 0..2 {
        tracer.record_tool_call(ToolCall {
            name: "search".to_string(),
            args: json!({"q": "the same thing"}),
            ..ToolCall::default()
        });
    }
    tracer.end_run(RunOutcome::Ok);

    let summary = tracer.store().load_run_meta(handle.run_id()).unwrap();
    assert_eq!(summary.counts.loop_warnings, 1);
    let events = tracer.store().load_events(handle.run_id()).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::LoopWarning));
}
