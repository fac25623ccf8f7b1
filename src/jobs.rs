//! Asynchronous curation job execution.
//!
//! Each accepted request becomes a tracked job: the caller gets a job id
//! immediately and polls for status while the consensus loop runs on a
//! blocking worker thread. State machine:
//!
//! ```text
//! queued → running → { completed | error }
//! ```
//!
//! Terminal states are sticky: cancellation and worker completion both
//! refuse to overwrite a job that already finished. Progress is written by
//! exactly one worker as a whole-record replacement under the map lock, so
//! concurrent pollers always read a consistent snapshot. Terminal jobs stay
//! pollable for a retention window and are evicted opportunistically on the
//! next submission.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::consensus::{self, CurationPlan};
use crate::models::{JobProgress, JobStatus, SelectionMethod};
use crate::progress::CurationReporter;
use crate::store::MemoryStore;

struct Job {
    status: JobStatus,
    progress: JobProgress,
    result: Option<crate::models::CurationOutcome>,
    error: Option<String>,
    cancel: Arc<AtomicBool>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Read-only view of a job, cloned out of the shared map for pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<crate::models::CurationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tracks and executes curation jobs. Cheap to clone; all clones share one
/// job map.
#[derive(Clone)]
pub struct JobRunner {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    retention_secs: u64,
}

impl JobRunner {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention_secs,
        }
    }

    /// Accept a curation request and start executing it in the background.
    ///
    /// The store snapshot is owned by the job, so later imports cannot
    /// change the data an in-flight job sees. Returns the new job id.
    pub fn submit(
        &self,
        store: Arc<MemoryStore>,
        excluded: HashSet<usize>,
        plan: CurationPlan,
    ) -> String {
        self.evict_expired();

        let job_id = Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut jobs = self.jobs.write().unwrap();
            jobs.insert(
                job_id.clone(),
                Job {
                    status: JobStatus::Queued,
                    progress: JobProgress::new(0, plan.iterations, "Queued"),
                    result: None,
                    error: None,
                    cancel: cancel.clone(),
                    created_at: Utc::now(),
                    finished_at: None,
                },
            );
        }

        let jobs = self.jobs.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            {
                let mut guard = jobs.write().unwrap();
                if let Some(job) = guard.get_mut(&id) {
                    if job.status.is_terminal() {
                        return; // cancelled before it ever ran
                    }
                    job.status = JobStatus::Running;
                    job.progress =
                        JobProgress::new(0, plan.iterations, "Starting curation");
                }
            }

            let reporter = JobReporter {
                jobs: jobs.clone(),
                job_id: id.clone(),
            };
            let worker_cancel = cancel.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                consensus::curate(&store, &excluded, &plan, &reporter, Some(&worker_cancel))
            })
            .await;

            let mut guard = jobs.write().unwrap();
            let Some(job) = guard.get_mut(&id) else {
                return;
            };
            if job.status.is_terminal() {
                return;
            }
            match outcome {
                Ok(Ok(result)) => {
                    job.progress = JobProgress::new(
                        result.iterations,
                        result.iterations,
                        "Curation complete",
                    );
                    job.result = Some(result);
                    job.status = JobStatus::Completed;
                }
                Ok(Err(e)) => {
                    job.error = Some(e.to_string());
                    job.status = JobStatus::Error;
                }
                Err(e) => {
                    job.error = Some(format!("Curation worker panicked: {}", e));
                    job.status = JobStatus::Error;
                }
            }
            job.finished_at = Some(Utc::now());
        });

        job_id
    }

    /// Snapshot a job by id. Repeated reads never mutate state; a terminal
    /// job returns the same payload every time.
    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().unwrap();
        jobs.get(job_id).map(|job| JobSnapshot {
            job_id: job_id.to_string(),
            status: job.status,
            progress: job.progress.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
        })
    }

    /// Cancel a job. A queued or running job transitions straight to the
    /// terminal `error` state with message `"cancelled"`; the worker halts at
    /// the next iteration boundary. Cancelling an already-terminal job is a
    /// no-op that returns its current snapshot.
    pub fn cancel(&self, job_id: &str) -> Option<JobSnapshot> {
        {
            let mut jobs = self.jobs.write().unwrap();
            let job = jobs.get_mut(job_id)?;
            if !job.status.is_terminal() {
                job.cancel.store(true, Ordering::Relaxed);
                job.status = JobStatus::Error;
                job.error = Some("cancelled".to_string());
                job.finished_at = Some(Utc::now());
            }
        }
        self.snapshot(job_id)
    }

    /// Drop terminal jobs older than the retention window.
    pub fn evict_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.retention_secs as i64);
        let mut jobs = self.jobs.write().unwrap();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished) => finished > cutoff,
            None => true,
        });
    }

    #[cfg(test)]
    fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }
}

/// Reporter installed by the runner: replaces the job's whole progress
/// record after each iteration.
struct JobReporter {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    job_id: String,
}

impl CurationReporter for JobReporter {
    fn iteration(&self, current: u32, total: u32, method: SelectionMethod) {
        let mut jobs = self.jobs.write().unwrap();
        if let Some(job) = jobs.get_mut(&self.job_id) {
            job.progress = JobProgress::new(
                current,
                total,
                format!("Running {} iteration {}/{}", method.as_str(), current, total),
            );
        }
    }
}
