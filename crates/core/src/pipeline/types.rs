//! Types for the pipeline module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::{Outcome, OutputInfo, TranscodeFailure, TranscodeResult};
use crate::resolver::{Action, Job};

/// Aggregate counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cached: usize,
    pub cancelled: usize,
    /// `total - completed - failed - cached - cancelled`.
    pub in_progress: usize,
}

/// Where a job ended up in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Skipped because a valid output already exists.
    Cached,
    /// Would run; only produced by dry runs.
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Per-job line of a run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub group_id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub action: Action,
    pub status: JobStatus,
    pub source_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TranscodeFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    fn base(job: &Job, status: JobStatus) -> Self {
        Self {
            job_id: job.job_id.clone(),
            group_id: job.group_id.clone(),
            source_path: job.source_path.clone(),
            output_path: job.output_path.clone(),
            action: job.action,
            status,
            source_size_bytes: job.fingerprint.size_bytes,
            output: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn cached(job: &Job) -> Self {
        Self::base(job, JobStatus::Cached)
    }

    pub fn pending(job: &Job) -> Self {
        Self::base(job, JobStatus::Pending)
    }

    pub fn from_result(job: &Job, result: &TranscodeResult) -> Self {
        let status = match &result.outcome {
            Outcome::Success(_) => JobStatus::Completed,
            Outcome::Failure(_) => JobStatus::Failed,
            Outcome::Cancelled => JobStatus::Cancelled,
        };
        Self {
            output: result.output_info().cloned(),
            failure: result.failure_info().cloned(),
            started_at: Some(result.started_at),
            finished_at: Some(result.finished_at),
            ..Self::base(job, status)
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: PipelineStats,
    /// One report per plan job, in plan order.
    pub jobs: Vec<JobReport>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Failed)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Bytes of verified output written this run.
    pub fn output_bytes(&self) -> u64 {
        self.jobs
            .iter()
            .filter_map(|j| j.output.as_ref())
            .map(|o| o.size_bytes)
            .sum()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
