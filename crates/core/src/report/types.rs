//! Report records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::pipeline::{JobStatus, RunSummary};
use crate::resolver::{BuildPlan, GroupValidationError, Job};

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cached: usize,
    pub cancelled: usize,
    pub total_source_bytes: u64,
    pub total_output_bytes: u64,
    /// Output bytes over source bytes of the jobs built this run.
    pub compression_ratio: f64,
    pub groups_processed: usize,
    pub groups_skipped: usize,
    pub validation_errors: Vec<GroupValidationError>,
}

/// One job line of the JSONL log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub group_id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub action: String,
    pub source_format: String,
    pub source_sample_rate: u32,
    pub source_bit_depth: Option<u8>,
    pub target_codec: String,
    pub target_sample_rate: u32,
    pub target_bit_depth: Option<u8>,
    pub bitrate_kbps: Option<u32>,
    pub dither: bool,
    pub status: JobStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub output_size_bytes: Option<u64>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A failed job, as listed in the JSON summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub group_id: String,
    pub source_path: PathBuf,
    pub error_code: String,
    pub error_message: String,
}

/// Everything written for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: ReportSummary,
    pub entries: Vec<ReportEntry>,
    pub errors: Vec<FailedJob>,
    /// Jobs per action name, cached ones included.
    pub action_counts: BTreeMap<String, usize>,
}

impl RunReport {
    /// Assembles a report from the plan and the run it produced.
    pub fn build(plan: &BuildPlan, run: &RunSummary) -> Self {
        // Item ids repeat across groups; output paths are unique within a plan.
        let jobs_by_output: BTreeMap<&Path, &Job> = plan
            .jobs
            .iter()
            .map(|j| (j.output_path.as_path(), j))
            .collect();

        let mut entries = Vec::with_capacity(run.jobs.len());
        let mut errors = Vec::new();
        let mut action_counts = BTreeMap::new();
        let mut built_source_bytes = 0;

        for report in &run.jobs {
            *action_counts
                .entry(report.action.as_str().to_string())
                .or_insert(0) += 1;

            if report.status == JobStatus::Completed {
                built_source_bytes += report.source_size_bytes;
            }
            if let Some(failure) = &report.failure {
                errors.push(FailedJob {
                    group_id: report.group_id.clone(),
                    source_path: report.source_path.clone(),
                    error_code: failure.kind.code().to_string(),
                    error_message: failure.message.clone(),
                });
            }

            let job = jobs_by_output.get(report.output_path.as_path()).copied();
            entries.push(ReportEntry {
                group_id: report.group_id.clone(),
                source_path: report.source_path.clone(),
                output_path: report.output_path.clone(),
                action: report.action.as_str().to_string(),
                source_format: report
                    .source_path
                    .extension()
                    .map(|e| e.to_string_lossy().to_uppercase())
                    .unwrap_or_default(),
                source_sample_rate: job.map(|j| j.source_sample_rate).unwrap_or(0),
                source_bit_depth: job.and_then(|j| j.source_bit_depth),
                target_codec: job.map(|j| j.codec.as_str().to_string()).unwrap_or_default(),
                target_sample_rate: job.map(|j| j.target.sample_rate).unwrap_or(0),
                target_bit_depth: job.and_then(|j| j.target.bit_depth),
                bitrate_kbps: job.and_then(|j| j.bitrate_kbps),
                dither: job.is_some_and(|j| j.target.dither),
                status: report.status,
                error_code: report.failure.as_ref().map(|f| f.kind.code().to_string()),
                error_message: report.failure.as_ref().map(|f| f.message.clone()),
                output_size_bytes: report.output.as_ref().map(|o| o.size_bytes),
                finished_at: report.finished_at,
            });
        }

        let total_output_bytes = run.output_bytes();
        let compression_ratio = if built_source_bytes > 0 {
            ((total_output_bytes as f64 / built_source_bytes as f64) * 1000.0).round() / 1000.0
        } else {
            0.0
        };

        let summary = ReportSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: run.started_at,
            completed_at: run.finished_at,
            duration_secs: run.duration_secs(),
            total_jobs: run.stats.total,
            succeeded: run.stats.completed,
            failed: run.stats.failed,
            cached: run.stats.cached,
            cancelled: run.stats.cancelled,
            total_source_bytes: plan.total_source_bytes(),
            total_output_bytes,
            compression_ratio,
            groups_processed: plan.group_count(),
            groups_skipped: plan.skipped_groups.len(),
            validation_errors: plan.validation_errors.clone(),
        };

        Self {
            summary,
            entries,
            errors,
            action_counts,
        }
    }
}
