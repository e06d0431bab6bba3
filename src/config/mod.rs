//! Configuration loading for redaction, loop detection, and the data directory.

mod settings;

pub use settings::{Settings, DEFAULT_REDACT_KEYS};
