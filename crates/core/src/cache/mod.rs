//! Persistent build cache keyed by source identity.
//!
//! The cache lets a re-run skip outputs that are already correct. An entry
//! only counts for a job when the fingerprint, settings hash and output path
//! all match.
//!
//! Only the pipeline orchestrator writes to the cache; transcode workers
//! never touch it.

mod sqlite;
mod types;

pub use sqlite::SqliteBuildCache;
pub use types::*;

use std::path::Path;

use crate::converter::TranscodeResult;
use crate::resolver::Job;

/// Default cache file name, created under the output root.
pub const DEFAULT_CACHE_FILE: &str = ".podbuild_cache.db";

/// Trait for build cache storage.
pub trait BuildCache: Send + Sync {
    /// Returns the entry for a job only on an exact match.
    ///
    /// The stored mtime may differ by up to [`MTIME_TOLERANCE_SECS`]; size,
    /// settings hash and output path must be identical. Any mismatch is a
    /// miss.
    fn lookup(&self, job: &Job) -> Result<Option<CacheEntry>, CacheError>;

    /// Records a successful build, replacing any previous entry for the
    /// source. Returns `false` without writing when the result is not a
    /// success.
    fn store(&self, job: &Job, result: &TranscodeResult) -> Result<bool, CacheError>;

    /// Raw entry for a source path, without validity checks.
    fn get(&self, source_path: &Path) -> Result<Option<CacheEntry>, CacheError>;

    /// Removes the entry for a source. Returns whether one existed.
    fn invalidate(&self, source_path: &Path) -> Result<bool, CacheError>;

    /// Removes every entry pointing at an output path.
    fn invalidate_output(&self, output_path: &Path) -> Result<usize, CacheError>;

    /// Removes all entries.
    fn clear(&self) -> Result<usize, CacheError>;

    /// Removes entries whose output file no longer exists.
    fn prune_missing(&self) -> Result<usize, CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;
}
