use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::util::paths::default_data_dir;

/// Sensitive key names redacted by default (matched case-insensitively).
pub const DEFAULT_REDACT_KEYS: &[&str] = &[
    "api_key",
    "authorization",
    "cookie",
    "password",
    "secret",
    "token",
];

const DEFAULT_MAX_FIELD_BYTES: usize = 20_000;
const DEFAULT_LOOP_WINDOW: usize = 12;
const DEFAULT_LOOP_REPETITIONS: usize = 3;

const MIN_MAX_FIELD_BYTES: usize = 100;
const MIN_LOOP_WINDOW: usize = 4;
const MIN_LOOP_REPETITIONS: usize = 2;

/// Runtime configuration for tracing, redaction, and loop detection.
///
/// Precedence (highest first): environment variables, the project's
/// `.agentdbg/config.toml`, the user's `~/.agentdbg/config.toml`, defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Whether sensitive keys are redacted at all.
    pub redact: bool,
    /// Sensitive key names; matched case-insensitively.
    pub redact_keys: Vec<String>,
    /// Maximum stored string size in bytes before truncation.
    pub max_field_bytes: usize,
    /// Sliding-window size for loop detection, in recorded calls.
    pub loop_window: usize,
    /// Occurrences of one signature within the window that trigger a warning.
    pub loop_repetitions: usize,
    /// Root directory holding one subdirectory per run.
    pub data_dir: PathBuf,
    /// Auto-create a run named "implicit" when recording with no active run.
    pub implicit_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redact: true,
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|s| s.to_string()).collect(),
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            loop_window: DEFAULT_LOOP_WINDOW,
            loop_repetitions: DEFAULT_LOOP_REPETITIONS,
            data_dir: default_data_dir(),
            implicit_run: false,
        }
    }
}

/// File representation of [`Settings`]; every field optional so partial
/// configs merge over the previous layer.
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlSettings {
    pub redact: Option<bool>,
    pub redact_keys: Option<Vec<String>>,
    pub max_field_bytes: Option<usize>,
    pub loop_window: Option<usize>,
    pub loop_repetitions: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub implicit_run: Option<bool>,
}

impl Settings {
    /// Load settings with full precedence, reading files and the process
    /// environment.
    pub fn load() -> Self {
        Self::load_from(std::env::current_dir().ok().as_deref())
    }

    /// Load settings rooted at `project_root` (defaults to the current
    /// directory when `None`).
    pub fn load_from(project_root: Option<&Path>) -> Self {
        let mut settings = Self::default();

        let user_config = default_data_dir().join("config.toml");
        settings.apply_file(&user_config);

        if let Some(root) = project_root {
            settings.apply_file(&root.join(".agentdbg").join("config.toml"));
        }

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Merge one TOML file into the current settings. Missing or invalid
    /// files leave the settings untouched.
    fn apply_file(&mut self, path: &Path) {
        let Ok(raw) = fs::read_to_string(path) else {
            return;
        };
        let parsed: TomlSettings = match toml::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                return;
            }
        };
        if let Some(redact) = parsed.redact {
            self.redact = redact;
        }
        if let Some(keys) = parsed.redact_keys {
            self.redact_keys = keys;
        }
        if let Some(v) = parsed.max_field_bytes {
            self.max_field_bytes = v.max(MIN_MAX_FIELD_BYTES);
        }
        if let Some(v) = parsed.loop_window {
            self.loop_window = v.max(MIN_LOOP_WINDOW);
        }
        if let Some(v) = parsed.loop_repetitions {
            self.loop_repetitions = v.max(MIN_LOOP_REPETITIONS);
        }
        if let Some(dir) = parsed.data_dir {
            self.data_dir = dir;
        }
        if let Some(implicit) = parsed.implicit_run {
            self.implicit_run = implicit;
        }
    }

    /// Apply `AGENTDBG_*` environment overrides through a lookup closure.
    ///
    /// Taking the lookup as a parameter keeps this testable without mutating
    /// the process environment. Unparsable values are ignored; numeric values
    /// are clamped to their minimums.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("AGENTDBG_REDACT") {
            self.redact = parse_bool(&raw);
        }
        if let Some(raw) = lookup("AGENTDBG_REDACT_KEYS") {
            self.redact_keys = raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("AGENTDBG_MAX_FIELD_BYTES") {
            if let Ok(v) = raw.trim().parse::<usize>() {
                self.max_field_bytes = v.max(MIN_MAX_FIELD_BYTES);
            }
        }
        if let Some(raw) = lookup("AGENTDBG_LOOP_WINDOW") {
            if let Ok(v) = raw.trim().parse::<usize>() {
                self.loop_window = v.max(MIN_LOOP_WINDOW);
            }
        }
        if let Some(raw) = lookup("AGENTDBG_LOOP_REPETITIONS") {
            if let Ok(v) = raw.trim().parse::<usize>() {
                self.loop_repetitions = v.max(MIN_LOOP_REPETITIONS);
            }
        }
        if let Some(raw) = lookup("AGENTDBG_DATA_DIR") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.data_dir = PathBuf::from(trimmed);
            }
        }
        if let Some(raw) = lookup("AGENTDBG_IMPLICIT_RUN") {
            self.implicit_run = parse_bool(&raw);
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
