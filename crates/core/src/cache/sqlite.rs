//! SQLite-backed build cache implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{BuildCache, CacheEntry, CacheError, CacheStats, MTIME_TOLERANCE_SECS};
use crate::converter::{Outcome, TranscodeResult};
use crate::resolver::Job;

const ENTRY_COLUMNS: &str = "source_path, output_path, source_mtime, source_size, settings_hash,
     output_codec, output_sample_rate, output_bit_depth, output_size_bytes, duration_seconds, built_at";

/// SQLite-backed build cache.
pub struct SqliteBuildCache {
    conn: Mutex<Connection>,
}

impl SqliteBuildCache {
    /// Opens or creates the cache database, creating parent directories and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CacheError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            -- One row per source file: the latest successful build
            CREATE TABLE IF NOT EXISTS build_cache (
                source_path TEXT PRIMARY KEY,
                output_path TEXT NOT NULL,
                source_mtime REAL NOT NULL,
                source_size INTEGER NOT NULL,
                settings_hash TEXT NOT NULL,
                output_codec TEXT NOT NULL,
                output_sample_rate INTEGER NOT NULL,
                output_bit_depth INTEGER,
                output_size_bytes INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                built_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_build_cache_output ON build_cache(output_path);
            CREATE INDEX IF NOT EXISTS idx_build_cache_hash ON build_cache(settings_hash);
            "#,
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Database("cache connection lock poisoned".to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
        let source_path: String = row.get(0)?;
        let output_path: String = row.get(1)?;
        let source_size: i64 = row.get(3)?;
        let output_bit_depth: Option<i64> = row.get(7)?;
        let output_size: i64 = row.get(8)?;
        let built_at_str: String = row.get(10)?;

        let built_at = DateTime::parse_from_rfc3339(&built_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(CacheEntry {
            source_path: PathBuf::from(source_path),
            output_path: PathBuf::from(output_path),
            source_mtime: row.get(2)?,
            source_size: source_size as u64,
            settings_hash: row.get(4)?,
            output_codec: row.get(5)?,
            output_sample_rate: row.get(6)?,
            output_bit_depth: output_bit_depth.map(|b| b as u8),
            output_size_bytes: output_size as u64,
            duration_secs: row.get(9)?,
            built_at,
        })
    }

    fn path_key(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }
}

impl BuildCache for SqliteBuildCache {
    fn lookup(&self, job: &Job) -> Result<Option<CacheEntry>, CacheError> {
        let Some(entry) = self.get(&job.source_path)? else {
            return Ok(None);
        };

        let fp = &job.fingerprint;
        let valid = (entry.source_mtime - fp.mtime_secs).abs() <= MTIME_TOLERANCE_SECS
            && entry.source_size == fp.size_bytes
            && entry.settings_hash == job.settings_hash
            && entry.output_path == job.output_path;

        Ok(valid.then_some(entry))
    }

    fn store(&self, job: &Job, result: &TranscodeResult) -> Result<bool, CacheError> {
        let Outcome::Success(ref output) = result.outcome else {
            return Ok(false);
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO build_cache ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                ENTRY_COLUMNS
            ),
            params![
                Self::path_key(&job.source_path),
                Self::path_key(&job.output_path),
                job.fingerprint.mtime_secs,
                job.fingerprint.size_bytes as i64,
                job.settings_hash,
                output.codec,
                output.sample_rate,
                output.bit_depth.map(i64::from),
                output.size_bytes as i64,
                output.duration_secs,
                result.finished_at.to_rfc3339(),
            ],
        )
        .map_err(|e| CacheError::Database(e.to_string()))?;

        debug!(source = %job.source_path.display(), "Stored cache entry");
        Ok(true)
    }

    fn get(&self, source_path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM build_cache WHERE source_path = ?",
                ENTRY_COLUMNS
            ),
            params![Self::path_key(source_path)],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| CacheError::Database(e.to_string()))
    }

    fn invalidate(&self, source_path: &Path) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "DELETE FROM build_cache WHERE source_path = ?",
                params![Self::path_key(source_path)],
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(rows > 0)
    }

    fn invalidate_output(&self, output_path: &Path) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM build_cache WHERE output_path = ?",
            params![Self::path_key(output_path)],
        )
        .map_err(|e| CacheError::Database(e.to_string()))
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM build_cache", [])
            .map_err(|e| CacheError::Database(e.to_string()))
    }

    fn prune_missing(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;

        let outputs: Vec<(String, String)> = {
            let mut stmt = conn
                .prepare("SELECT source_path, output_path FROM build_cache")
                .map_err(|e| CacheError::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| CacheError::Database(e.to_string()))?;

            let mut outputs = Vec::new();
            for row in rows {
                outputs.push(row.map_err(|e| CacheError::Database(e.to_string()))?);
            }
            outputs
        };

        let mut removed = 0;
        for (source, output) in outputs {
            if Path::new(&output).exists() {
                continue;
            }
            removed += conn
                .execute(
                    "DELETE FROM build_cache WHERE source_path = ?",
                    params![source],
                )
                .map_err(|e| CacheError::Database(e.to_string()))?;
        }

        debug!(removed, "Pruned cache entries with missing outputs");
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn()?;
        let (count, total): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(output_size_bytes), 0) FROM build_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(CacheStats {
            entry_count: count as u64,
            total_output_bytes: total as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{FailureKind, OutputInfo, TranscodeFailure};
    use crate::resolver::{settings_hash, TOOL_VERSION};
    use crate::testing::fixtures;

    fn create_test_cache() -> SqliteBuildCache {
        SqliteBuildCache::in_memory().unwrap()
    }

    fn success_for(job: &Job) -> TranscodeResult {
        TranscodeResult::success(
            job,
            OutputInfo {
                codec: "alac".to_string(),
                sample_rate: 44100,
                bit_depth: Some(16),
                duration_secs: 180.0,
                size_bytes: 2048,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_store_and_lookup_hit() {
        let cache = create_test_cache();
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");

        assert!(cache.lookup(&job).unwrap().is_none());
        assert!(cache.store(&job, &success_for(&job)).unwrap());

        let entry = cache.lookup(&job).unwrap().expect("entry should hit");
        assert_eq!(entry.output_codec, "alac");
        assert_eq!(entry.output_bit_depth, Some(16));
        assert_eq!(entry.output_path, job.output_path);
    }

    #[test]
    fn test_store_ignores_failures() {
        let cache = create_test_cache();
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        let failed = TranscodeResult::failure(
            &job,
            TranscodeFailure::new(FailureKind::Encode, "boom"),
            Utc::now(),
        );

        assert!(!cache.store(&job, &failed).unwrap());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_lookup_mtime_tolerance() {
        let cache = create_test_cache();
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        cache.store(&job, &success_for(&job)).unwrap();

        let mut jitter = job.clone();
        jitter.fingerprint.mtime_secs += 0.0005;
        assert!(cache.lookup(&jitter).unwrap().is_some());

        let mut touched = job.clone();
        touched.fingerprint.mtime_secs += 0.01;
        assert!(cache.lookup(&touched).unwrap().is_none());
    }

    #[test]
    fn test_rescan_across_millisecond_boundary_still_hits() {
        let cache = create_test_cache();
        let mut job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        job.fingerprint.mtime_secs = 1_700_000_000.2504;
        cache.store(&job, &success_for(&job)).unwrap();

        // Same file re-fingerprinted with sub-millisecond drift, re-resolved.
        let mut rescanned = job.clone();
        rescanned.fingerprint.mtime_secs = 1_700_000_000.2506;
        rescanned.settings_hash = settings_hash(
            &rescanned.fingerprint,
            rescanned.action,
            rescanned.bitrate_kbps,
            rescanned.target.sample_rate,
            rescanned.target.bit_depth,
            TOOL_VERSION,
        );

        assert_eq!(rescanned.settings_hash, job.settings_hash);
        assert!(cache.lookup(&rescanned).unwrap().is_some());
    }

    #[test]
    fn test_lookup_misses_on_any_mismatch() {
        let cache = create_test_cache();
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        cache.store(&job, &success_for(&job)).unwrap();

        let mut resized = job.clone();
        resized.fingerprint.size_bytes += 1;
        assert!(cache.lookup(&resized).unwrap().is_none());

        let mut rehashed = job.clone();
        rehashed.settings_hash = "0000000000000000".to_string();
        assert!(cache.lookup(&rehashed).unwrap().is_none());

        let mut moved = job.clone();
        moved.output_path = PathBuf::from("/out/b/01.m4a");
        assert!(cache.lookup(&moved).unwrap().is_none());
    }

    #[test]
    fn test_store_replaces_previous_entry() {
        let cache = create_test_cache();
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        cache.store(&job, &success_for(&job)).unwrap();

        let mut rebuilt = job.clone();
        rebuilt.settings_hash = "ffffffffffffffff".to_string();
        cache.store(&rebuilt, &success_for(&rebuilt)).unwrap();

        assert_eq!(cache.stats().unwrap().entry_count, 1);
        assert!(cache.lookup(&job).unwrap().is_none());
        assert!(cache.lookup(&rebuilt).unwrap().is_some());
    }

    #[test]
    fn test_invalidate_targets_one_entry() {
        let cache = create_test_cache();
        let a = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        let b = fixtures::job("/music/a/02.flac", "/out/a/02.m4a");
        cache.store(&a, &success_for(&a)).unwrap();
        cache.store(&b, &success_for(&b)).unwrap();

        assert!(cache.invalidate(&a.source_path).unwrap());
        assert!(!cache.invalidate(&a.source_path).unwrap());
        assert!(cache.lookup(&b).unwrap().is_some());

        assert_eq!(cache.invalidate_output(&b.output_path).unwrap(), 1);
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_clear_and_stats() {
        let cache = create_test_cache();
        for i in 0..3 {
            let job = fixtures::job(&format!("/music/{}.flac", i), &format!("/out/{}.m4a", i));
            cache.store(&job, &success_for(&job)).unwrap();
        }
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 3);
        assert_eq!(stats.total_output_bytes, 3 * 2048);

        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn test_prune_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("present.m4a");
        std::fs::write(&present, b"data").unwrap();
        let missing = dir.path().join("missing.m4a");

        let cache = create_test_cache();
        let a = fixtures::job("/music/a.flac", present.to_str().unwrap());
        let b = fixtures::job("/music/b.flac", missing.to_str().unwrap());
        cache.store(&a, &success_for(&a)).unwrap();
        cache.store(&b, &success_for(&b)).unwrap();

        assert_eq!(cache.prune_missing().unwrap(), 1);
        assert!(cache.get(&a.source_path).unwrap().is_some());
        assert!(cache.get(&b.source_path).unwrap().is_none());
    }

    #[test]
    fn test_file_backed_cache_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let job = fixtures::job("/music/a/01.flac", "/out/a/01.m4a");
        {
            let cache = SqliteBuildCache::new(&path).unwrap();
            cache.store(&job, &success_for(&job)).unwrap();
        }
        let reopened = SqliteBuildCache::new(&path).unwrap();
        assert!(reopened.lookup(&job).unwrap().is_some());
    }
}
