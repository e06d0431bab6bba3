//! REST API route definitions.

use axum::{routing::get, Router};

use crate::web::handlers::runs;
use crate::web::state::WebAppState;

/// Build the API router with all REST endpoints.
pub fn api_routes() -> Router<WebAppState> {
    Router::new()
        .route("/runs", get(runs::list_runs))
        .route("/runs/{run_id}", get(runs::get_run))
        .route("/runs/{run_id}/events", get(runs::get_run_events))
}
