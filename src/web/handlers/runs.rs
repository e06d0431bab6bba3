//! Run handlers for the viewer API.
//!
//! Run identifiers arrive as opaque path segments; the storage layer
//! validates them before any filesystem access, and that validation failure
//! maps to 400 while a well-formed-but-absent run maps to 404.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::events::{Event, RunSummary, SPEC_VERSION};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

const DEFAULT_LIST_LIMIT: usize = 50;

/// Query parameters for listing runs.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

/// Response for listing runs.
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub spec_version: &'static str,
    pub runs: Vec<RunSummary>,
}

/// Response for one run's events.
#[derive(Debug, Serialize)]
pub struct RunEventsResponse {
    pub spec_version: &'static str,
    pub run_id: String,
    pub events: Vec<Event>,
}

/// List recent runs, most recent first.
pub async fn list_runs(
    State(state): State<WebAppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListRunsResponse>, WebError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let runs = state
        .store()
        .list_runs(limit)
        .map_err(|e| WebError::Internal(format!("Failed to list runs: {}", e)))?;
    Ok(Json(ListRunsResponse {
        spec_version: SPEC_VERSION,
        runs,
    }))
}

/// Get one run's summary.
pub async fn get_run(
    State(state): State<WebAppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunSummary>, WebError> {
    let summary = state.store().load_run_meta(&run_id)?;
    Ok(Json(summary))
}

/// Get one run's events in sequence order.
pub async fn get_run_events(
    State(state): State<WebAppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunEventsResponse>, WebError> {
    let events = state.store().load_events(&run_id)?;
    Ok(Json(RunEventsResponse {
        spec_version: SPEC_VERSION,
        run_id,
        events,
    }))
}
