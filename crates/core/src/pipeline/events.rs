//! Events emitted while a run executes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::trace;

use super::types::PipelineStats;
use crate::converter::{FailureKind, OutputInfo};

/// Typed progress stream for display and logging consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        total: usize,
        cached: usize,
        pending: usize,
        dry_run: bool,
    },
    JobStarted {
        job_id: String,
        source_path: PathBuf,
        output_path: PathBuf,
    },
    JobProgress {
        job_id: String,
        percent: f32,
    },
    JobCached {
        job_id: String,
        output_path: PathBuf,
    },
    JobCompleted {
        job_id: String,
        output_path: PathBuf,
        output: OutputInfo,
    },
    JobFailed {
        job_id: String,
        source_path: PathBuf,
        kind: FailureKind,
        message: String,
    },
    JobCancelled {
        job_id: String,
    },
    RunCompleted {
        stats: PipelineStats,
    },
}

/// Fire-and-forget event delivery.
///
/// A full or closed channel drops the event; the pipeline never waits on a
/// consumer.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                trace!(error = %e, "Dropped pipeline event");
            }
        }
    }
}
