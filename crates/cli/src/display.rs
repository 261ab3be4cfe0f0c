//! Renders pipeline events as log lines.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use podbuild_core::PipelineEvent;

/// Consumes events until the pipeline drops its sender.
pub async fn render(mut rx: mpsc::Receiver<PipelineEvent>) {
    let mut total = 0;
    let mut done = 0;

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::RunStarted {
                total: t,
                cached,
                pending,
                dry_run,
            } => {
                total = t;
                done = cached;
                if dry_run {
                    info!("Dry run: {} jobs, {} cached, {} would build", t, cached, pending);
                } else {
                    info!("Building {} of {} jobs ({} cached)", pending, t, cached);
                }
            }
            PipelineEvent::JobStarted { source_path, .. } => {
                debug!("Encoding {}", source_path.display());
            }
            PipelineEvent::JobProgress { job_id, percent } => {
                debug!(job_id = %job_id, "{:.0}%", percent);
            }
            PipelineEvent::JobCached { output_path, .. } => {
                debug!("Cached {}", output_path.display());
            }
            PipelineEvent::JobCompleted {
                output_path,
                output,
                ..
            } => {
                done += 1;
                info!(
                    "[{}/{}] {} ({}, {} Hz)",
                    done,
                    total,
                    output_path.display(),
                    output.codec,
                    output.sample_rate
                );
            }
            PipelineEvent::JobFailed {
                source_path,
                kind,
                message,
                ..
            } => {
                done += 1;
                warn!(
                    "[{}/{}] {} failed [{}]: {}",
                    done,
                    total,
                    source_path.display(),
                    kind.code(),
                    message
                );
            }
            PipelineEvent::JobCancelled { job_id } => {
                done += 1;
                debug!(job_id = %job_id, "Cancelled");
            }
            PipelineEvent::RunCompleted { stats } => {
                info!(
                    "Done: {} built, {} cached, {} failed, {} cancelled",
                    stats.completed, stats.cached, stats.failed, stats.cancelled
                );
            }
        }
    }
}
