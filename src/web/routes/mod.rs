//! Route definitions for the viewer server.

pub mod api;
pub mod static_files;
