//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the encode contract.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder binary not found.
    #[error("FFmpeg not found at path: {path}")]
    EncoderNotFound { path: PathBuf },

    /// Encoder ran and reported failure.
    #[error("Encode failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// Encode did not finish in time.
    #[error("Encode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The request asks for something the encoder cannot do.
    #[error("Unsupported encode request: {reason}")]
    Unsupported { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Creates a new encode failed error with stderr output.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }

    /// The most useful text for a user: tool output when present.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed {
                reason,
                stderr: Some(stderr),
            } if !stderr.trim().is_empty() => format!("{}: {}", reason, stderr.trim()),
            other => other.to_string(),
        }
    }
}

/// Errors from probing an artifact.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    ProberNotFound { path: PathBuf },

    #[error("Failed to probe media file: {reason}")]
    Failed { reason: String },

    #[error("Failed to parse media info: {reason}")]
    Parse { reason: String },

    #[error("Probe timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors from the tag-write contract.
#[derive(Debug, Error)]
pub enum TagWriteError {
    #[error("Tag write failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagWriteError {
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }
}

/// Reasons an artifact fails verification.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Output file missing: {path}")]
    Missing { path: PathBuf },

    #[error("Output file is empty: {path}")]
    Empty { path: PathBuf },

    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("No audio stream in output")]
    NoAudioStream,

    #[error("Codec '{found}' not allowed, expected one of {allowed:?}")]
    CodecMismatch {
        found: String,
        allowed: &'static [&'static str],
    },

    #[error("Sample rate {found}Hz does not match expected {expected}Hz")]
    SampleRateMismatch { found: u32, expected: u32 },

    #[error("Duration missing or unparseable")]
    InvalidDuration,
}
