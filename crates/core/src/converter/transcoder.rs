//! Runs one job through encode, verify, tag and atomic rename.
//!
//! Stage order: `RUNNING -> VERIFIED -> TAGGED -> RENAMED`. Everything is
//! written to a temporary file next to the final output, so the rename is on
//! the same filesystem. A failure at any stage removes the temporary file and
//! leaves the final path untouched.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::EncoderConfig;
use super::error::{EncodeError, TagWriteError};
use super::ffmpeg::FfmpegEncoder;
use super::probe::FfprobeProber;
use super::tagger::FfmpegTagWriter;
use super::traits::{Encoder, Prober, TagWriter};
use super::types::{
    EncodeProgress, EncodeSpec, FailureKind, OutputInfo, TranscodeFailure, TranscodeResult,
};
use super::verifier::verify_artifact;
use crate::resolver::{Action, Job};

/// Why a job stopped before producing an output.
enum Halt {
    Failed(TranscodeFailure),
    Cancelled,
}

impl Halt {
    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed(TranscodeFailure::new(kind, message))
    }
}

/// Executes single jobs. Holds no per-job state, so one instance is shared
/// by every worker.
pub struct Transcoder {
    encoder: Arc<dyn Encoder>,
    prober: Arc<dyn Prober>,
    tag_writer: Arc<dyn TagWriter>,
    encode_timeout: Duration,
    probe_timeout: Duration,
}

impl Transcoder {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        prober: Arc<dyn Prober>,
        tag_writer: Arc<dyn TagWriter>,
    ) -> Self {
        let defaults = EncoderConfig::default();
        Self {
            encoder,
            prober,
            tag_writer,
            encode_timeout: defaults.encode_timeout(),
            probe_timeout: defaults.probe_timeout(),
        }
    }

    /// Creates a transcoder backed by ffmpeg and ffprobe.
    pub fn ffmpeg(config: &EncoderConfig) -> Self {
        Self::new(
            Arc::new(FfmpegEncoder::new(config.clone())),
            Arc::new(FfprobeProber::new(config.clone())),
            Arc::new(FfmpegTagWriter::new(config.clone())),
        )
        .with_timeouts(config.encode_timeout(), config.probe_timeout())
    }

    pub fn with_timeouts(mut self, encode: Duration, probe: Duration) -> Self {
        self.encode_timeout = encode;
        self.probe_timeout = probe;
        self
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// Temporary path for an output: `<dir>/<stem>.tmp.<ext>`.
    pub fn temp_path(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match output.extension() {
            Some(ext) => output.with_file_name(format!("{}.tmp.{}", stem, ext.to_string_lossy())),
            None => output.with_file_name(format!("{}.tmp", stem)),
        }
    }

    /// Runs a job to completion and reports exactly one result.
    ///
    /// The token is checked between stages. An external process that is
    /// already running is allowed to finish; the job then reports
    /// `Cancelled` at the next check instead of committing its output.
    pub async fn transcode(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> TranscodeResult {
        let started_at = Utc::now();
        if cancel.is_cancelled() {
            return TranscodeResult::cancelled(job, started_at);
        }

        let temp = Self::temp_path(&job.output_path);
        match self.run_stages(job, &temp, cancel, progress_tx).await {
            Ok(info) => TranscodeResult::success(job, info, started_at),
            Err(halt) => {
                Self::cleanup(&temp).await;
                match halt {
                    Halt::Cancelled => {
                        debug!(job_id = %job.job_id, "Job cancelled");
                        TranscodeResult::cancelled(job, started_at)
                    }
                    Halt::Failed(failure) => {
                        debug!(
                            job_id = %job.job_id,
                            kind = failure.kind.code(),
                            message = %failure.message,
                            "Job failed"
                        );
                        TranscodeResult::failure(job, failure, started_at)
                    }
                }
            }
        }
    }

    async fn run_stages(
        &self,
        job: &Job,
        temp: &Path,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<OutputInfo, Halt> {
        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Halt::failed(
                    FailureKind::Io,
                    format!("Failed to create {}: {}", parent.display(), e),
                )
            })?;
        }

        // RUNNING
        if job.action == Action::Passthrough {
            match timeout(self.encode_timeout, tokio::fs::copy(&job.source_path, temp)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Halt::failed(FailureKind::Io, format!("Copy failed: {}", e))),
                Err(_) => {
                    return Err(Halt::failed(
                        FailureKind::Io,
                        format!("Copy timed out after {} seconds", self.encode_timeout.as_secs()),
                    ))
                }
            }
        } else {
            let spec = EncodeSpec::for_job(job, temp);
            match timeout(self.encode_timeout, self.encoder.encode(&spec, progress_tx)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Halt::failed(FailureKind::Encode, e.diagnostic())),
                Err(_) => {
                    let e = EncodeError::Timeout {
                        timeout_secs: self.encode_timeout.as_secs(),
                    };
                    return Err(Halt::failed(FailureKind::Encode, e.to_string()));
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        // VERIFIED
        let mut info = verify_artifact(
            self.prober.as_ref(),
            temp,
            job.codec,
            job.target.sample_rate,
            self.probe_timeout,
        )
        .await
        .map_err(|e| Halt::failed(FailureKind::Verification, e.to_string()))?;

        // TAGGED
        let artwork = Self::load_artwork(job).await;
        let written = timeout(
            self.encode_timeout,
            self.tag_writer.write_tags(temp, &job.tags, artwork.as_deref()),
        )
        .await
        .map_err(|_| {
            Halt::failed(
                FailureKind::TagWrite,
                format!("Tag write timed out after {} seconds", self.encode_timeout.as_secs()),
            )
        })?;
        written.map_err(|e| {
            let message = match e {
                TagWriteError::Failed {
                    reason,
                    stderr: Some(stderr),
                } => format!("{}: {}", reason, stderr),
                other => other.to_string(),
            };
            Halt::failed(FailureKind::TagWrite, message)
        })?;

        // RENAMED
        if cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        tokio::fs::rename(temp, &job.output_path)
            .await
            .map_err(|e| Halt::failed(FailureKind::Io, format!("Rename failed: {}", e)))?;

        if let Ok(meta) = tokio::fs::metadata(&job.output_path).await {
            info.size_bytes = meta.len();
        }
        Ok(info)
    }

    async fn load_artwork(job: &Job) -> Option<Vec<u8>> {
        let path = job.artwork.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(
                    job_id = %job.job_id,
                    artwork = %path.display(),
                    error = %e,
                    "Artwork unreadable, writing tags without it"
                );
                None
            }
        }
    }

    async fn cleanup(temp: &Path) {
        match tokio::fs::remove_file(temp).await {
            Ok(()) => debug!(path = %temp.display(), "Removed temporary file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %temp.display(), error = %e, "Failed to remove temporary file"),
        }
    }
}
