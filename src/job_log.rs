//! Structured JSONL log of job runs.
//!
//! Every run appends machine-parseable entries to `events.jsonl` with:
//! - Monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - A per-process instance ID and per-run ID for correlation

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct JobLogger {
    instance_id: String,
    run_id: AtomicU64,
    seq: AtomicU64,
    log_file: Mutex<File>,
    #[allow(dead_code)]
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across the process lifetime)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    /// Process instance ID
    pub instance_id: String,
    /// Run ID (increments for every triggered job run)
    pub run_id: u64,
    /// Component that emitted the log
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl JobLogger {
    /// Creates a logger writing to `<logs_dir>/events.jsonl`.
    pub fn new(logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            run_id: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    /// Advances the run ID; called once per triggered job run.
    pub fn increment_run_id(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event. Serialization or write failures are
    /// swallowed; the log never takes down a run.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            instance_id: self.instance_id.clone(),
            run_id: self.run_id.load(Ordering::SeqCst),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_run_started(&self, window: &str) {
        self.log(
            "Job",
            serde_json::json!({
                "type": "RunStarted",
                "window": window
            }),
        );
    }

    pub fn log_run_completed(&self, rows: usize, events: usize, batches: usize) {
        self.log(
            "Job",
            serde_json::json!({
                "type": "RunCompleted",
                "rows": rows,
                "events": events,
                "batches": batches
            }),
        );
    }

    pub fn log_run_failed(&self, error: &str) {
        self.log(
            "Job",
            serde_json::json!({
                "type": "RunFailed",
                "error": error
            }),
        );
    }

    pub fn log_trigger_fired(&self, hour: u32, minute: u32) {
        self.log(
            "Trigger",
            serde_json::json!({
                "type": "TriggerFired",
                "hour": hour,
                "minute": minute
            }),
        );
    }

    pub fn log_trigger_skipped(&self) {
        self.log(
            "Trigger",
            serde_json::json!({
                "type": "TriggerSkipped",
                "reason": "run already in progress"
            }),
        );
    }

    /// Returns the path to the log file.
    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
