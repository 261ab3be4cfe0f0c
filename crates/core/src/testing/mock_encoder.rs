//! Mock encoder for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::converter::{EncodeError, EncodeProgress, EncodeSpec, Encoder, ProbeInfo};
use crate::resolver::CodecClass;

/// Mock implementation of the Encoder trait.
///
/// Instead of audio, it writes a JSON [`ProbeInfo`] describing the requested
/// output to the destination, which [`super::MockProber`] reads back.
///
/// Provides controllable behavior for testing:
/// - Records every spec for assertions
/// - Fails the next call, or every call for chosen sources
/// - Simulates encode latency
/// - Tracks peak concurrency
///
/// # Example
///
/// ```rust,ignore
/// use podbuild_core::testing::MockEncoder;
///
/// let encoder = MockEncoder::new();
/// encoder.set_encode_duration(Duration::from_millis(10)).await;
/// encoder.fail_source("/music/a/02.flac").await;
///
/// // Run the pipeline...
///
/// assert_eq!(encoder.encode_count().await, 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockEncoder {
    /// Recorded specs, in call order.
    specs: Arc<RwLock<Vec<EncodeSpec>>>,
    /// If set, the next encode fails with this error.
    next_error: Arc<RwLock<Option<EncodeError>>>,
    /// Sources that always fail.
    failing_sources: Arc<RwLock<HashSet<PathBuf>>>,
    /// Simulated encode duration in milliseconds.
    encode_duration_ms: Arc<RwLock<u64>>,
    /// Codec name written into outputs instead of the requested one.
    reported_codec: Arc<RwLock<Option<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even when the encode future is dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockEncoder {
    /// Create a new mock encoder.
    pub fn new() -> Self {
        Self {
            specs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_sources: Arc::new(RwLock::new(HashSet::new())),
            encode_duration_ms: Arc::new(RwLock::new(0)),
            reported_codec: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded specs.
    pub async fn recorded_specs(&self) -> Vec<EncodeSpec> {
        self.specs.read().await.clone()
    }

    /// Get the number of encodes attempted.
    pub async fn encode_count(&self) -> usize {
        self.specs.read().await.len()
    }

    /// Clear recorded specs.
    pub async fn clear_recorded(&self) {
        self.specs.write().await.clear();
    }

    /// Configure the next encode to fail with the given error.
    pub async fn set_next_error(&self, error: EncodeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every encode of this source fail.
    pub async fn fail_source(&self, path: impl AsRef<Path>) {
        self.failing_sources
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Set the simulated encode duration.
    pub async fn set_encode_duration(&self, duration: Duration) {
        *self.encode_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Override the codec name written into outputs.
    pub async fn set_reported_codec(&self, codec: Option<String>) {
        *self.reported_codec.write().await = codec;
    }

    /// Highest number of encodes that ran at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn codec_name(codec: CodecClass) -> &'static str {
        match codec {
            CodecClass::Alac => "alac",
            CodecClass::Aac => "aac",
            CodecClass::Copy => "mp3",
        }
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<(), EncodeError> {
        self.specs.write().await.push(spec.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        let duration_ms = *self.encode_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if self.failing_sources.read().await.contains(&spec.source_path) {
            return Err(EncodeError::failed(
                "FFmpeg exited with code: Some(1)",
                Some(format!("{}: Invalid data found", spec.source_path.display())),
            ));
        }

        let codec = self
            .reported_codec
            .read()
            .await
            .clone()
            .unwrap_or_else(|| Self::codec_name(spec.codec).to_string());
        let info = ProbeInfo {
            format_name: "mov".to_string(),
            codec: Some(codec),
            sample_rate: Some(spec.sample_rate),
            bit_depth: spec.bit_depth,
            channels: Some(2),
            duration_secs: Some(spec.duration_secs.unwrap_or(1.0)),
        };
        let body = serde_json::to_vec(&info)
            .map_err(|e| EncodeError::failed(format!("mock serialization: {}", e), None))?;
        tokio::fs::write(&spec.dest_path, body).await?;

        if let Some(tx) = progress_tx {
            let _ = tx.try_send(EncodeProgress {
                job_id: spec.job_id.clone(),
                percent: 100.0,
                time_secs: spec.duration_secs.unwrap_or(1.0),
            });
        }

        Ok(())
    }
}
