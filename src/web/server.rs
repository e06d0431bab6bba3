//! Axum web server for the AgentDbg viewer.

use std::net::SocketAddr;

use axum::{http::header, http::Method, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::api::api_routes;
use super::routes::static_files::serve_index;
use super::state::WebAppState;

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable CORS for development (allows any origin).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            cors_permissive: false,
        }
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint handler.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the Axum router with all routes.
pub fn build_router(state: WebAppState, cors_permissive: bool) -> Router {
    let cors = if cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE])
    };

    let core_routes = Router::new().route("/health", get(health));

    Router::new()
        .nest("/api", core_routes.merge(api_routes()))
        .route("/", get(serve_index))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the viewer server. Blocks until shutdown.
pub async fn run_server(state: WebAppState, config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = build_router(state, config.cors_permissive);

    tracing::info!("Starting viewer server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RunSummary, SPEC_VERSION};
    use crate::storage::{new_run_id, RunStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> (WebAppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        (WebAppState::new(RunStore::new(dir.path())), dir)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
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
    async fn health_endpoint_responds() {
        let (state, _dir) = test_state();
        let app = build_router(state, true);
        let (status, body) = get(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn list_runs_empty_store() {
        let (state, _dir) = test_state();
        let app = build_router(state, false);
        let (status, body) = get(app, "/api/runs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["spec_version"], SPEC_VERSION);
        assert_eq!(body["runs"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_run_returns_summary() {
        let (state, _dir) = test_state();
        let summary = RunSummary::new(new_run_id(), "api-run");
        state.store().create_run(&summary).unwrap();

        let app = build_router(state, false);
        let (status, body) = get(app, &format!("/api/runs/{}", summary.run_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_name"], "api-run");
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn malformed_run_ids_rejected_with_400() {
        let (state, _dir) = test_state();
        let app = build_router(state, false);

        for bad in [
            "not-a-uuid",
            "00000000-0000-0000-0000-00000000000g",
            "00000000-0000-0000-0000-000000000000..",
            "%2e",
            "%2e%2e",
            "%252e%252e",
        ] {
            let (status, _) = get(app.clone(), &format!("/api/runs/{}", bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "for run id {:?}", bad);
            let (status, _) = get(app.clone(), &format!("/api/runs/{}/events", bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "for run id {:?}", bad);
        }
    }

    #[tokio::test]
    async fn traversal_payloads_never_succeed() {
        let (state, _dir) = test_state();
        let app = build_router(state, false);

        // These may be eaten by routing before the handler; any status but
        // 200 is acceptable.
        for bad in [
            "../etc/passwd",
            "..%2f..%2fetc%2fpasswd",
            "%2e%2e%2f%2e%2e%2fetc%2fpasswd",
            "..%5c..%5cWindows%5cwin.ini",
        ] {
            let (status, _) = get(app.clone(), &format!("/api/runs/{}", bad)).await;
            assert_ne!(status, StatusCode::OK, "for run id {:?}", bad);
            let (status, _) = get(app.clone(), &format!("/api/runs/{}/events", bad)).await;
            assert_ne!(status, StatusCode::OK, "for run id {:?}", bad);
        }
    }

    #[tokio::test]
    async fn absent_run_is_404() {
        let (state, _dir) = test_state();
        let app = build_router(state, false);
        let id = new_run_id();
        let (status, _) = get(app.clone(), &format!("/api/runs/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(app, &format!("/api/runs/{}/events", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn index_serves_html() {
        let (state, _dir) = test_state();
        let app = build_router(state, false);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/html"));
    }
}
