//! Viewer API over real recorded runs.

use agentdbg::web::server::build_router;
use agentdbg::web::WebAppState;
use agentdbg::{EventType, RunOutcome, RunStore, ToolCall, SPEC_VERSION};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use super::temp_tracer;

async fn get_json(
    app: axum::Router,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn recorded_run_is_visible_through_the_api() {
    let (tracer, dir) = temp_tracer();
    let handle = tracer.begin_run("api-visible", json!({}));
    tracer.record_tool_call(ToolCall {
        name: "search".to_string(),
        args: json!({"q": "hello"}),
        ..ToolCall::default()
    });
    tracer.end_run(RunOutcome::Ok);

    let state = WebAppState::new(RunStore::new(dir.path()));
    let app = build_router(state, false);

    let (status, body) = get_json(app.clone(), "/api/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spec_version"], SPEC_VERSION);
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["run_id"], handle.run_id());
    assert_eq!(runs[0]["status"], "ok");
    assert_eq!(runs[0]["counts"]["tool_calls"], 1);

    let (status, body) = get_json(app.clone(), &format!("/api/runs/{}", handle.run_id())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_name"], "api-visible");

    let (status, body) =
        get_json(app, &format!("/api/runs/{}/events", handle.run_id())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], handle.run_id());
    let events = body["events"].as_array().unwrap();
    assert_eq!(events[0]["event_type"], "RUN_START");
    assert_eq!(
        events.last().unwrap()["event_type"],
        serde_json::to_value(EventType::RunEnd).unwrap()
    );
}

#[tokio::test]
async fn list_limit_caps_results() {
    let (tracer, dir) = temp_tracer();
    for i in 0..3 {
        tracer.begin_run(&format!("run-{}", i), json!({}));
        tracer.end_run(RunOutcome::Ok);
    }

    let state = WebAppState::new(RunStore::new(dir.path()));
    let app = build_router(state, false);
    let (status, body) = get_json(app, "/api/runs?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runs"].as_array().unwrap().len(), 2);
}
