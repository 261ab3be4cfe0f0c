//! Converter module: the encode, probe and tag contracts, their FFmpeg
//! implementations, and the per-job transcoder.
//!
//! # Example
//!
//! ```ignore
//! use podbuild_core::converter::{EncoderConfig, Transcoder};
//! use tokio_util::sync::CancellationToken;
//!
//! let transcoder = Transcoder::ffmpeg(&EncoderConfig::default());
//! let result = transcoder.transcode(&job, &CancellationToken::new(), None).await;
//! if let Some(failure) = result.failure_info() {
//!     eprintln!("{}: {}", failure.kind.code(), failure.message);
//! }
//! ```

mod config;
mod error;
mod ffmpeg;
mod probe;
mod tagger;
mod traits;
mod transcoder;
mod types;
mod verifier;

pub use config::EncoderConfig;
pub use error::{EncodeError, ProbeError, TagWriteError, VerificationError};
pub use ffmpeg::FfmpegEncoder;
pub use probe::FfprobeProber;
pub use tagger::{ArtworkKind, FfmpegTagWriter};
pub use traits::{Encoder, Prober, TagWriter};
pub use transcoder::Transcoder;
pub use types::{
    EncodeProgress, EncodeSpec, FailureKind, OutputInfo, Outcome, ProbeInfo, TranscodeFailure,
    TranscodeResult, MAX_DIAGNOSTIC_CHARS,
};
pub use verifier::{check_probe, verify_artifact, SAMPLE_RATE_TOLERANCE_HZ};
