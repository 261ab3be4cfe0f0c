//! Artifact verification.

use std::path::Path;
use tokio::time::{timeout, Duration};

use super::error::{ProbeError, VerificationError};
use super::traits::Prober;
use super::types::{OutputInfo, ProbeInfo};
use crate::resolver::CodecClass;

/// Allowed sample rate drift between target and artifact, in Hz.
pub const SAMPLE_RATE_TOLERANCE_HZ: u32 = 100;

/// Checks probed attributes against what the job asked for.
pub fn check_probe(
    info: &ProbeInfo,
    size_bytes: u64,
    codec: CodecClass,
    expected_sample_rate: u32,
) -> Result<OutputInfo, VerificationError> {
    let found = info.codec.as_deref().ok_or(VerificationError::NoAudioStream)?;
    let allowed = codec.allowed_codecs();
    if !allowed.contains(&found) {
        return Err(VerificationError::CodecMismatch {
            found: found.to_string(),
            allowed,
        });
    }

    let sample_rate = info.sample_rate.unwrap_or(0);
    if sample_rate.abs_diff(expected_sample_rate) > SAMPLE_RATE_TOLERANCE_HZ {
        return Err(VerificationError::SampleRateMismatch {
            found: sample_rate,
            expected: expected_sample_rate,
        });
    }

    let duration_secs = info
        .duration_secs
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or(VerificationError::InvalidDuration)?;

    Ok(OutputInfo {
        codec: found.to_string(),
        sample_rate,
        bit_depth: info.bit_depth,
        duration_secs,
        size_bytes,
    })
}

/// Verifies an artifact on disk: present, non-empty, and probing to the
/// expected codec class and sample rate.
pub async fn verify_artifact(
    prober: &dyn Prober,
    path: &Path,
    codec: CodecClass,
    expected_sample_rate: u32,
    probe_timeout: Duration,
) -> Result<OutputInfo, VerificationError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| VerificationError::Missing {
            path: path.to_path_buf(),
        })?;
    if meta.len() == 0 {
        return Err(VerificationError::Empty {
            path: path.to_path_buf(),
        });
    }

    let info = timeout(probe_timeout, prober.probe(path))
        .await
        .map_err(|_| ProbeError::Timeout {
            timeout_secs: probe_timeout.as_secs(),
        })??;

    check_probe(&info, meta.len(), codec, expected_sample_rate)
}
