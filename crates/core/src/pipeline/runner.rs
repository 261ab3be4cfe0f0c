//! Run orchestration: cache partition, bounded workers, result collection.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::PipelineConfig;
use super::events::{EventSink, PipelineEvent};
use super::types::{JobReport, PipelineStats, RunSummary};
use crate::cache::BuildCache;
use crate::converter::{
    EncodeProgress, FailureKind, Outcome, TranscodeFailure, TranscodeResult, Transcoder,
};
use crate::resolver::{BuildPlan, Job};

/// Error type for pipeline operations.
///
/// Job failures are not errors; they are reported in the [`RunSummary`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Concurrency must be at least one.
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(usize),

    /// A worker task could not be joined.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Live counters for the current run.
#[derive(Default)]
struct RunCounters {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cached: AtomicUsize,
    cancelled: AtomicUsize,
}

impl RunCounters {
    fn reset(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.cached.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        let total = self.total.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let cached = self.cached.load(Ordering::Relaxed);
        let cancelled = self.cancelled.load(Ordering::Relaxed);
        PipelineStats {
            total,
            completed,
            failed,
            cached,
            cancelled,
            in_progress: total.saturating_sub(completed + failed + cached + cancelled),
        }
    }
}

/// Executes build plans.
///
/// The pipeline is the only writer to the cache: workers return results and
/// the orchestrating loop stores them after collecting each one. Run one plan
/// at a time per instance; the live counters are shared.
pub struct ConversionPipeline {
    config: PipelineConfig,
    cache: Arc<dyn BuildCache>,
    transcoder: Arc<Transcoder>,
    events: EventSink,
    cancel: CancellationToken,
    counters: Arc<RunCounters>,
}

impl ConversionPipeline {
    pub fn new(
        config: PipelineConfig,
        cache: Arc<dyn BuildCache>,
        transcoder: Arc<Transcoder>,
    ) -> Self {
        Self {
            config,
            cache,
            transcoder,
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Sends run events to the given channel.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels every current and future run of this pipeline.
    ///
    /// Queued jobs stop before starting. A running encode finishes, then its
    /// job reports cancelled without committing output.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Counters of the current (or last) run.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Runs a plan.
    ///
    /// Jobs with a valid cache entry and a non-empty output on disk are
    /// skipped. With `dry_run` nothing runs and nothing is written; pending
    /// jobs are only reported.
    pub async fn execute(
        &self,
        plan: &BuildPlan,
        dry_run: bool,
    ) -> Result<RunSummary, PipelineError> {
        if self.config.concurrency == 0 {
            return Err(PipelineError::InvalidConcurrency(0));
        }

        let started_at = Utc::now();
        self.counters.reset(plan.len());

        let mut reports: Vec<Option<JobReport>> = vec![None; plan.len()];
        let mut pending = Vec::new();
        for (index, job) in plan.jobs.iter().enumerate() {
            if self.is_cache_eligible(job).await {
                self.counters.cached.fetch_add(1, Ordering::Relaxed);
                reports[index] = Some(JobReport::cached(job));
                if !dry_run {
                    self.events.emit(PipelineEvent::JobCached {
                        job_id: job.job_id.clone(),
                        output_path: job.output_path.clone(),
                    });
                }
            } else {
                pending.push(index);
            }
        }

        let cached = plan.len() - pending.len();
        info!(
            total = plan.len(),
            cached,
            pending = pending.len(),
            dry_run,
            "Starting run"
        );
        self.events.emit(PipelineEvent::RunStarted {
            total: plan.len(),
            cached,
            pending: pending.len(),
            dry_run,
        });

        if dry_run {
            for index in pending {
                reports[index] = Some(JobReport::pending(&plan.jobs[index]));
            }
        } else {
            self.run_pending(plan, pending, &mut reports).await?;
        }

        let stats = self.counters.snapshot();
        let summary = RunSummary {
            dry_run,
            started_at,
            finished_at: Utc::now(),
            stats,
            jobs: reports.into_iter().flatten().collect(),
        };

        info!(
            completed = stats.completed,
            failed = stats.failed,
            cached = stats.cached,
            cancelled = stats.cancelled,
            duration_secs = summary.duration_secs(),
            "Run finished"
        );
        self.events.emit(PipelineEvent::RunCompleted { stats });

        Ok(summary)
    }

    async fn is_cache_eligible(&self, job: &Job) -> bool {
        if self.config.force {
            return false;
        }

        match self.cache.lookup(job) {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Cache lookup failed, rebuilding");
                return false;
            }
        }

        match tokio::fs::metadata(&job.output_path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => {
                debug!(job_id = %job.job_id, "Cached output missing on disk");
                false
            }
        }
    }

    async fn run_pending(
        &self,
        plan: &BuildPlan,
        pending: Vec<usize>,
        reports: &mut [Option<JobReport>],
    ) -> Result<(), PipelineError> {
        let run_token = self.cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers = JoinSet::new();

        for index in pending {
            let job = plan.jobs[index].clone();
            let semaphore = Arc::clone(&semaphore);
            let transcoder = Arc::clone(&self.transcoder);
            let events = self.events.clone();
            let token = run_token.child_token();

            workers.spawn(async move {
                let result = run_worker(job, semaphore, transcoder, events, token).await;
                (index, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let (index, result) = joined.map_err(|e| PipelineError::Worker(e.to_string()))?;
            let job = &plan.jobs[index];
            self.record(job, &result, &run_token);
            reports[index] = Some(JobReport::from_result(job, &result));
        }

        Ok(())
    }

    /// Applies one collected result: counters, cache, events, fail-fast.
    fn record(&self, job: &Job, result: &TranscodeResult, run_token: &CancellationToken) {
        match &result.outcome {
            Outcome::Success(output) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.cache.store(job, result) {
                    warn!(job_id = %job.job_id, error = %e, "Failed to record build in cache");
                }
                debug!(job_id = %job.job_id, output = %job.output_path.display(), "Job completed");
                self.events.emit(PipelineEvent::JobCompleted {
                    job_id: job.job_id.clone(),
                    output_path: job.output_path.clone(),
                    output: output.clone(),
                });
            }
            Outcome::Failure(failure) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    job_id = %job.job_id,
                    source = %job.source_path.display(),
                    kind = failure.kind.code(),
                    "Job failed: {}",
                    failure.message
                );
                self.events.emit(PipelineEvent::JobFailed {
                    job_id: job.job_id.clone(),
                    source_path: job.source_path.clone(),
                    kind: failure.kind,
                    message: failure.message.clone(),
                });
                if self.config.fail_fast && !run_token.is_cancelled() {
                    warn!("Fail-fast: cancelling remaining jobs");
                    run_token.cancel();
                }
            }
            Outcome::Cancelled => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job.job_id, "Job cancelled");
                self.events.emit(PipelineEvent::JobCancelled {
                    job_id: job.job_id.clone(),
                });
            }
        }
    }
}

/// Body of one worker task. Always yields exactly one result.
async fn run_worker(
    job: Job,
    semaphore: Arc<Semaphore>,
    transcoder: Arc<Transcoder>,
    events: EventSink,
    token: CancellationToken,
) -> TranscodeResult {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return TranscodeResult::cancelled(&job, Utc::now());
    };
    if token.is_cancelled() {
        return TranscodeResult::cancelled(&job, Utc::now());
    }

    let started_at = Utc::now();
    events.emit(PipelineEvent::JobStarted {
        job_id: job.job_id.clone(),
        source_path: job.source_path.clone(),
        output_path: job.output_path.clone(),
    });

    let progress_tx = events.is_enabled().then(|| forward_progress(events.clone()));

    match AssertUnwindSafe(transcoder.transcode(&job, &token, progress_tx))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let _ = tokio::fs::remove_file(Transcoder::temp_path(&job.output_path)).await;
            TranscodeResult::failure(
                &job,
                TranscodeFailure::new(
                    FailureKind::Io,
                    format!("worker panicked: {}", panic_message(panic.as_ref())),
                ),
                started_at,
            )
        }
    }
}

/// Relays encoder progress into the event stream until the sender drops.
fn forward_progress(events: EventSink) -> mpsc::Sender<EncodeProgress> {
    let (tx, mut rx) = mpsc::channel::<EncodeProgress>(16);
    tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            events.emit(PipelineEvent::JobProgress {
                job_id: progress.job_id,
                percent: progress.percent,
            });
        }
    });
    tx
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
