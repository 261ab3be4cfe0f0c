//! Types for the build cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Maximum mtime drift accepted on lookup, absorbing filesystem rounding.
pub const MTIME_TOLERANCE_SECS: f64 = 0.001;

/// The latest successful build of one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub source_mtime: f64,
    pub source_size: u64,
    pub settings_hash: String,
    pub output_codec: String,
    pub output_sample_rate: u32,
    pub output_bit_depth: Option<u8>,
    pub output_size_bytes: u64,
    pub duration_secs: f64,
    pub built_at: DateTime<Utc>,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub total_output_bytes: u64,
}

/// Errors for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
