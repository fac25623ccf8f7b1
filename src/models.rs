//! Core data models used throughout Photo Curator.
//!
//! These types represent the selection requests, frequency records, and job
//! state that flow through the curation pipeline.

use serde::{Deserialize, Serialize};

/// Which selection strategy an iteration uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Farthest-Point Sampling: greedily maximizes minimum distance to the
    /// already-selected set, biasing toward diverse, non-redundant images.
    Fps,
    /// K-Means medoid selection: clusters the candidates and returns the real
    /// item closest to each centroid.
    Kmeans,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::Fps => "fps",
            SelectionMethod::Kmeans => "kmeans",
        }
    }
}

impl std::str::FromStr for SelectionMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fps" => Ok(SelectionMethod::Fps),
            "kmeans" => Ok(SelectionMethod::Kmeans),
            other => anyhow::bail!("Unknown selection method: {}. Use fps or kmeans.", other),
        }
    }
}

/// Filename metadata for one indexed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub filename: String,
    pub subfolder: String,
    pub filepath: String,
}

/// Per-item consensus statistics for an item chosen in at least one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyRecord {
    pub index: usize,
    pub filename: String,
    pub subfolder: String,
    pub filepath: String,
    /// Number of iterations in which the item was selected.
    pub count: u32,
    /// `100 * count / iterations`, as a percentage.
    pub frequency: f64,
}

/// Final output of one consensus curation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationOutcome {
    /// Winning indices, highest consensus frequency first. Length is the
    /// requested target count, clipped to the candidate pool size.
    pub selected_indices: Vec<usize>,
    /// Filepaths for `selected_indices`, in the same order.
    pub selected_files: Vec<String>,
    /// Frequency table for every item selected in at least one iteration,
    /// sorted by descending count then ascending index.
    pub analysis_results: Vec<FrequencyRecord>,
    /// Achieved selection size (equals `selected_indices.len()`).
    pub count: usize,
    /// The target the caller asked for, before clipping.
    pub target_count: usize,
    /// Iterations actually run (after clamping).
    pub iterations: u32,
}

/// Lifecycle state of a curation job.
///
/// `Completed` and `Error` are terminal; a job never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Point-in-time progress of a running job. The runner replaces the whole
/// record on each update so pollers never see a torn snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub current: u32,
    pub total: u32,
    pub percentage: f64,
    pub step: String,
}

impl JobProgress {
    pub fn new(current: u32, total: u32, step: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            100.0 * f64::from(current) / f64::from(total)
        };
        Self {
            current,
            total,
            percentage,
            step: step.into(),
        }
    }
}
