//! Read-only web surface: the viewer API and the static viewer page.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::WebError;
pub use server::{run_server, ServerConfig};
pub use state::WebAppState;
