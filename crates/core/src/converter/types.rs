//! Types for the converter module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::resolver::{CodecClass, Job};

/// Longest diagnostic kept on a failure.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Input to the encode contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSpec {
    pub job_id: String,
    pub source_path: PathBuf,
    pub codec: CodecClass,
    pub sample_rate: u32,
    pub bit_depth: Option<u8>,
    pub dither: bool,
    /// Attenuate before folding more than two channels down to stereo.
    pub downmix: bool,
    pub resample: bool,
    pub bitrate_kbps: Option<u32>,
    pub dest_path: PathBuf,
    /// Source duration, used for progress percentages.
    pub duration_secs: Option<f64>,
}

impl EncodeSpec {
    /// Builds the encode request for a job writing to `dest_path`.
    pub fn for_job(job: &Job, dest_path: &Path) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source_path: job.source_path.clone(),
            codec: job.codec,
            sample_rate: job.target.sample_rate,
            bit_depth: job.target.bit_depth,
            dither: job.target.dither,
            downmix: job.downmix,
            resample: job.target.resample,
            bitrate_kbps: job.bitrate_kbps,
            dest_path: dest_path.to_path_buf(),
            duration_secs: (job.source_duration_secs > 0.0).then_some(job.source_duration_secs),
        }
    }
}

/// Progress update during an encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub job_id: String,
    /// 0.0 to 100.0
    pub percent: f32,
    pub time_secs: f64,
}

/// What a probe reports about a media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub format_name: String,
    /// Codec of the first audio stream.
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub channels: Option<u8>,
    pub duration_secs: Option<f64>,
}

/// Observed attributes of a verified output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub codec: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    pub duration_secs: f64,
    pub size_bytes: u64,
}

/// The stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Encoder failed or timed out.
    #[serde(rename = "ENCODE_FAIL")]
    Encode,
    #[serde(rename = "VERIFICATION_FAIL")]
    Verification,
    #[serde(rename = "TAG_WRITE_FAIL")]
    TagWrite,
    #[serde(rename = "IO_ERROR")]
    Io,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Encode => "ENCODE_FAIL",
            Self::Verification => "VERIFICATION_FAIL",
            Self::TagWrite => "TAG_WRITE_FAIL",
            Self::Io => "IO_ERROR",
        }
    }
}

/// A terminal job failure with a short diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TranscodeFailure {
    /// Creates a failure, truncating the message to [`MAX_DIAGNOSTIC_CHARS`].
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        let message = if message.chars().count() > MAX_DIAGNOSTIC_CHARS {
            message.chars().take(MAX_DIAGNOSTIC_CHARS).collect()
        } else {
            message
        };
        Self { kind, message }
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success(OutputInfo),
    Failure(TranscodeFailure),
    /// Stopped by its cancellation token before finishing.
    Cancelled,
}

/// Result of one transcode job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub job_id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TranscodeResult {
    fn finish(job: &Job, outcome: Outcome, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source_path: job.source_path.clone(),
            output_path: job.output_path.clone(),
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn success(job: &Job, output: OutputInfo, started_at: DateTime<Utc>) -> Self {
        Self::finish(job, Outcome::Success(output), started_at)
    }

    pub fn failure(job: &Job, failure: TranscodeFailure, started_at: DateTime<Utc>) -> Self {
        Self::finish(job, Outcome::Failure(failure), started_at)
    }

    pub fn cancelled(job: &Job, started_at: DateTime<Utc>) -> Self {
        Self::finish(job, Outcome::Cancelled, started_at)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn failure_info(&self) -> Option<&TranscodeFailure> {
        match &self.outcome {
            Outcome::Failure(f) => Some(f),
            _ => None,
        }
    }

    pub fn output_info(&self) -> Option<&OutputInfo> {
        match &self.outcome {
            Outcome::Success(info) => Some(info),
            _ => None,
        }
    }
}
