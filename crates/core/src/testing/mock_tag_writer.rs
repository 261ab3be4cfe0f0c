//! Mock tag writer for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{TagWriteError, TagWriter};
use crate::resolver::TagPayload;

/// A recorded tag write for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTagWrite {
    pub path: PathBuf,
    pub tags: TagPayload,
    pub artwork_bytes: Option<Vec<u8>>,
}

/// Mock implementation of the TagWriter trait. Leaves files untouched.
#[derive(Debug, Clone, Default)]
pub struct MockTagWriter {
    writes: Arc<RwLock<Vec<RecordedTagWrite>>>,
    /// If set, the next write fails with this message.
    next_error: Arc<RwLock<Option<String>>>,
    write_duration: Arc<RwLock<Duration>>,
}

impl MockTagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded writes.
    pub async fn recorded_writes(&self) -> Vec<RecordedTagWrite> {
        self.writes.read().await.clone()
    }

    /// Configure the next write to fail.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    /// Make every write take this long before returning.
    pub async fn set_write_duration(&self, duration: Duration) {
        *self.write_duration.write().await = duration;
    }
}

#[async_trait]
impl TagWriter for MockTagWriter {
    async fn write_tags(
        &self,
        path: &Path,
        tags: &TagPayload,
        artwork: Option<&[u8]>,
    ) -> Result<(), TagWriteError> {
        self.writes.write().await.push(RecordedTagWrite {
            path: path.to_path_buf(),
            tags: tags.clone(),
            artwork_bytes: artwork.map(<[u8]>::to_vec),
        });

        let duration = *self.write_duration.read().await;
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        if let Some(message) = self.next_error.write().await.take() {
            return Err(TagWriteError::failed(message, None));
        }
        Ok(())
    }
}
