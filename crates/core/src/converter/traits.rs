//! Trait definitions for the converter module.
//!
//! These are the narrow contracts to external tools. The transcoder depends
//! only on them, so tests substitute deterministic fakes.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::{EncodeError, ProbeError, TagWriteError};
use super::types::{EncodeProgress, EncodeSpec, ProbeInfo};
use crate::resolver::TagPayload;

/// Produces an encoded artifact at `spec.dest_path`.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Runs one encode to completion.
    ///
    /// If the progress sender is full or dropped, encoding continues without
    /// progress reporting.
    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<(), EncodeError>;
}

/// Reads technical attributes from a media file.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, ProbeError>;
}

/// Writes tags and optional artwork into a finished artifact in place.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write_tags(
        &self,
        path: &Path,
        tags: &TagPayload,
        artwork: Option<&[u8]>,
    ) -> Result<(), TagWriteError>;
}
