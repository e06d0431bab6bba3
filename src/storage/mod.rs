//! Per-run storage: one directory per run holding a mutable `run.json`
//! summary and an append-only `events.jsonl` log.
//!
//! Every lookup validates the run identifier before touching the filesystem.
//! That validation is the sole defense against path-traversal style inputs,
//! independent of any routing layer above.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::events::{Event, RunSummary};

/// Summary file name inside each run directory.
const RUN_SUMMARY_FILE: &str = "run.json";

/// Event log file name inside each run directory.
const EVENT_LOG_FILE: &str = "events.jsonl";

#[derive(Debug, Error)]
pub enum StorageError {
    /// The identifier is not a lowercase hyphenated UUID. Raised before any
    /// filesystem access.
    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    /// The identifier is well-formed but no such run exists.
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Mint a fresh run identifier (lowercase hyphenated UUID v4).
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate a run identifier's lexical syntax.
///
/// Accepts exactly the form [`new_run_id`] produces: parsing must succeed and
/// re-encoding must reproduce the input byte-for-byte, which rejects braces,
/// URNs, uppercase hex, and anything containing path separators or dots.
pub fn validate_run_id(run_id: &str) -> Result<(), StorageError> {
    let parsed =
        Uuid::try_parse(run_id).map_err(|_| StorageError::InvalidRunId(run_id.to_string()))?;
    if parsed.as_hyphenated().to_string() != run_id {
        return Err(StorageError::InvalidRunId(run_id.to_string()));
    }
    Ok(())
}

/// Append-only writer for one run's event log.
///
/// Each append writes a single serialized line and flushes it immediately, so
/// a crash loses at most the write in flight. Callers serialize access; the
/// tracer keeps this behind the per-run mutex.
pub struct EventLog {
    file: File,
}

impl EventLog {
    pub fn append(&mut self, event: &Event) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Filesystem store for run summaries and event logs.
#[derive(Debug, Clone)]
pub struct RunStore {
    data_dir: PathBuf,
}

impl RunStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory for one run. Callers must have validated `run_id` first.
    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.data_dir.join(run_id)
    }

    /// Create the run directory, write the initial summary, and open the
    /// event log for appending.
    pub fn create_run(&self, summary: &RunSummary) -> Result<EventLog, StorageError> {
        validate_run_id(&summary.run_id)?;
        fs::create_dir_all(self.run_dir(&summary.run_id))?;
        self.write_summary(summary)?;
        self.open_log(&summary.run_id)
    }

    /// Rewrite the run summary. Used on each lifecycle transition.
    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), StorageError> {
        validate_run_id(&summary.run_id)?;
        let path = self.run_dir(&summary.run_id).join(RUN_SUMMARY_FILE);
        let body = serde_json::to_vec_pretty(summary)?;
        fs::write(path, body)?;
        Ok(())
    }

    /// Open the append-only event log for a run.
    pub fn open_log(&self, run_id: &str) -> Result<EventLog, StorageError> {
        validate_run_id(run_id)?;
        let path = self.run_dir(run_id).join(EVENT_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(EventLog { file })
    }

    /// The `limit` most recent run summaries, ordered by start time
    /// descending. Reads only summaries; unreadable entries are skipped.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>, StorageError> {
        let mut runs = Vec::new();
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            // A data dir that was never written to simply has no runs.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let summary_path = entry.path().join(RUN_SUMMARY_FILE);
            let Ok(raw) = fs::read_to_string(&summary_path) else {
                continue;
            };
            match serde_json::from_str::<RunSummary>(&raw) {
                Ok(summary) => runs.push(summary),
                Err(e) => {
                    tracing::debug!(path = %summary_path.display(), error = %e, "Skipping unreadable run summary");
                }
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    /// Load one run's summary. Malformed ids fail validation; well-formed but
    /// absent ids are [`StorageError::RunNotFound`].
    pub fn load_run_meta(&self, run_id: &str) -> Result<RunSummary, StorageError> {
        validate_run_id(run_id)?;
        let path = self.run_dir(run_id).join(RUN_SUMMARY_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::RunNotFound(run_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load one run's events in sequence order.
    ///
    /// A truncated trailing line (crash mid-append) is skipped rather than
    /// failing the whole read.
    pub fn load_events(&self, run_id: &str) -> Result<Vec<Event>, StorageError> {
        validate_run_id(run_id)?;
        let dir = self.run_dir(run_id);
        if !dir.join(RUN_SUMMARY_FILE).is_file() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        let path = dir.join(EVENT_LOG_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(run_id, error = %e, "Skipping unparsable event line");
                }
            }
        }
        Ok(events)
    }
}
