//! Static file serving for the bundled viewer page.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Viewer page bundled with the binary.
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Serve the viewer index page.
pub async fn serve_index() -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML).into_response()
}
