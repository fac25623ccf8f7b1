//! Curation progress reporting.
//!
//! The consensus loop reports once per completed iteration. CLI runs emit
//! progress on **stderr** so stdout remains parseable for scripts; the job
//! runner installs its own reporter that updates the job's shared progress
//! record instead.

use std::io::Write;

use crate::models::SelectionMethod;

/// Reports per-iteration curation progress. Implementations must be safe to
/// call from a blocking worker thread.
pub trait CurationReporter: Send + Sync {
    /// Called after iteration `current` of `total` has finished.
    fn iteration(&self, current: u32, total: u32, method: SelectionMethod);
}

/// Human-friendly progress on stderr: "curate fps  iteration 3 / 10".
pub struct StderrProgress;

impl CurationReporter for StderrProgress {
    fn iteration(&self, current: u32, total: u32, method: SelectionMethod) {
        let line = format!(
            "curate {}  iteration {} / {}\n",
            method.as_str(),
            current,
            total
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CurationReporter for JsonProgress {
    fn iteration(&self, current: u32, total: u32, method: SelectionMethod) {
        let obj = serde_json::json!({
            "event": "progress",
            "method": method.as_str(),
            "iteration": current,
            "total": total,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CurationReporter for NoProgress {
    fn iteration(&self, _current: u32, _total: u32, _method: SelectionMethod) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn CurationReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
