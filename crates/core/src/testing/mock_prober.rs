//! Mock prober for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{ProbeError, ProbeInfo, Prober};

/// Mock implementation of the Prober trait.
///
/// Returns a configured result for a path when one is set, otherwise parses
/// the file's contents as a JSON [`ProbeInfo`] (the format
/// [`super::MockEncoder`] writes).
#[derive(Debug, Clone, Default)]
pub struct MockProber {
    results: Arc<RwLock<HashMap<PathBuf, ProbeInfo>>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: ProbeInfo) {
        self.results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, ProbeError> {
        if let Some(info) = self.results.read().await.get(path) {
            return Ok(info.clone());
        }

        let body = tokio::fs::read(path).await?;
        serde_json::from_slice(&body).map_err(|e| ProbeError::Parse {
            reason: format!("not a mock media file: {}", e),
        })
    }
}
