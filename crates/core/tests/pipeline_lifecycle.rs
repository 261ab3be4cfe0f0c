//! Pipeline lifecycle integration tests.
//!
//! These tests run the conversion pipeline end to end with mock tools:
//! - Idempotent re-runs served from the cache
//! - Cache precision when sources or settings change
//! - Fail-fast cancellation and failure isolation
//! - Atomic output under cancellation and failed stages
//! - Bounded concurrency

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use podbuild_core::{
    cache::DEFAULT_CACHE_FILE,
    converter::{EncodeError, EncodeProgress, EncodeSpec, Encoder, FailureKind},
    library::ItemGroup,
    pipeline::{JobStatus, PipelineEvent},
    resolve_build_plan,
    testing::{fixtures, MockEncoder, MockProber, MockTagWriter},
    BuildCache, BuildPlan, ConversionPipeline, Decision, PipelineConfig, Policy,
    SqliteBuildCache, Transcoder,
};

/// Test helper wiring a pipeline to mocks and a file-backed cache.
struct TestHarness {
    encoder: MockEncoder,
    tag_writer: MockTagWriter,
    cache: Arc<SqliteBuildCache>,
    source_dir: TempDir,
    output_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let output_dir = TempDir::new().expect("Failed to create output dir");
        let cache = Arc::new(
            SqliteBuildCache::new(&output_dir.path().join(DEFAULT_CACHE_FILE))
                .expect("Failed to create cache"),
        );
        Self {
            encoder: MockEncoder::new(),
            tag_writer: MockTagWriter::new(),
            cache,
            source_dir: TempDir::new().expect("Failed to create source dir"),
            output_dir,
        }
    }

    fn policy(&self) -> Policy {
        Policy::default().with_output_root(self.output_dir.path())
    }

    fn pipeline(&self, config: PipelineConfig) -> ConversionPipeline {
        self.pipeline_with_encoder(config, Arc::new(self.encoder.clone()))
    }

    fn pipeline_with_encoder(
        &self,
        config: PipelineConfig,
        encoder: Arc<dyn Encoder>,
    ) -> ConversionPipeline {
        let transcoder = Transcoder::new(
            encoder,
            Arc::new(MockProber::new()),
            Arc::new(self.tag_writer.clone()),
        );
        ConversionPipeline::new(
            config,
            Arc::clone(&self.cache) as Arc<dyn BuildCache>,
            Arc::new(transcoder),
        )
    }

    fn album(&self, id: &str, extension: &str, sample_rate: u32, bit_depth: Option<u8>, tracks: u32) -> ItemGroup {
        fixtures::album_on_disk(self.source_dir.path(), id, extension, sample_rate, bit_depth, tracks)
    }

    fn plan(&self, groups: &[ItemGroup]) -> BuildPlan {
        resolve_build_plan(groups, &HashMap::new(), &self.policy())
    }

    fn cache_entries(&self) -> u64 {
        self.cache.stats().expect("Failed to read cache stats").entry_count
    }
}

fn config(concurrency: usize) -> PipelineConfig {
    PipelineConfig::default().with_concurrency(concurrency)
}

fn temp_path_of(output: &Path) -> PathBuf {
    Transcoder::temp_path(output)
}

// =============================================================================
// Idempotence and cache precision
// =============================================================================

#[tokio::test]
async fn test_rerun_with_unchanged_inputs_encodes_nothing() {
    let h = TestHarness::new();
    let plan = h.plan(&[
        h.album("cd", "flac", 44100, Some(16), 3),
        h.album("hires", "flac", 96000, Some(24), 2),
    ]);
    let pipeline = h.pipeline(config(2));

    let first = pipeline.execute(&plan, false).await.unwrap();
    assert_eq!(first.stats.completed, 5);
    assert!(!first.has_failures());
    assert_eq!(h.encoder.encode_count().await, 5);
    assert_eq!(h.cache_entries(), 5);
    for job in &plan.jobs {
        assert!(job.output_path.exists(), "{}", job.output_path.display());
    }

    let second = pipeline.execute(&plan, false).await.unwrap();
    assert_eq!(second.stats.cached, 5);
    assert_eq!(second.stats.completed, 0);
    assert_eq!(second.count(JobStatus::Cached), 5);
    assert_eq!(h.encoder.encode_count().await, 5);
}

#[tokio::test]
async fn test_source_change_invalidates_only_that_job() {
    let h = TestHarness::new();
    let mut group = h.album("cd", "flac", 44100, Some(16), 3);
    let pipeline = h.pipeline(config(2));
    pipeline.execute(&h.plan(&[group.clone()]), false).await.unwrap();

    // Size change on the first track
    let first = group.items[0].path().to_path_buf();
    std::fs::write(&first, b"re-ripped with a different length").unwrap();
    group.items[0].fingerprint = fixtures::fingerprint_of(&first);

    // Mtime-only change on the second track
    let second = group.items[1].path().to_path_buf();
    let file = std::fs::OpenOptions::new().write(true).open(&second).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
    drop(file);
    group.items[1].fingerprint = fixtures::fingerprint_of(&second);

    h.encoder.clear_recorded().await;
    let summary = pipeline.execute(&h.plan(&[group]), false).await.unwrap();

    assert_eq!(summary.stats.completed, 2);
    assert_eq!(summary.stats.cached, 1);
    let rebuilt: Vec<PathBuf> = h
        .encoder
        .recorded_specs()
        .await
        .into_iter()
        .map(|s| s.source_path)
        .collect();
    assert!(rebuilt.contains(&first));
    assert!(rebuilt.contains(&second));
}

#[tokio::test]
async fn test_settings_change_invalidates_entries() {
    let h = TestHarness::new();
    let group = h.album("oggs", "ogg", 44100, None, 2);
    let pipeline = h.pipeline(config(2));
    pipeline.execute(&h.plan(&[group.clone()]), false).await.unwrap();

    let decisions = HashMap::from([(
        "oggs".to_string(),
        Decision {
            bitrate_kbps: Some(320),
            ..Default::default()
        },
    )]);
    let plan = resolve_build_plan(&[group], &decisions, &h.policy());
    let summary = pipeline.execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.cached, 0);
    assert_eq!(summary.stats.completed, 2);
    assert_eq!(h.encoder.encode_count().await, 4);
}

#[tokio::test]
async fn test_tool_version_change_invalidates_everything() {
    let h = TestHarness::new();
    let group = h.album("cd", "flac", 44100, Some(16), 2);
    let pipeline = h.pipeline(config(2));
    pipeline.execute(&h.plan(&[group.clone()]), false).await.unwrap();

    let policy = h.policy().with_tool_version("99.0.0");
    let plan = resolve_build_plan(&[group], &HashMap::new(), &policy);
    let summary = pipeline.execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.cached, 0);
    assert_eq!(summary.stats.completed, 2);
}

#[tokio::test]
async fn test_missing_or_empty_output_is_rebuilt() {
    let h = TestHarness::new();
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 3)]);
    let pipeline = h.pipeline(config(2));
    pipeline.execute(&plan, false).await.unwrap();

    std::fs::remove_file(&plan.jobs[0].output_path).unwrap();
    std::fs::write(&plan.jobs[1].output_path, b"").unwrap();

    let summary = pipeline.execute(&plan, false).await.unwrap();
    assert_eq!(summary.stats.completed, 2);
    assert_eq!(summary.stats.cached, 1);
    assert!(plan.jobs[0].output_path.exists());
}

#[tokio::test]
async fn test_force_ignores_cache() {
    let h = TestHarness::new();
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 2)]);
    h.pipeline(config(2)).execute(&plan, false).await.unwrap();

    let summary = h
        .pipeline(config(2).with_force(true))
        .execute(&plan, false)
        .await
        .unwrap();
    assert_eq!(summary.stats.cached, 0);
    assert_eq!(summary.stats.completed, 2);
    assert_eq!(h.encoder.encode_count().await, 4);
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let h = TestHarness::new();
    let built = h.album("built", "flac", 44100, Some(16), 2);
    h.pipeline(config(2))
        .execute(&h.plan(&[built.clone()]), false)
        .await
        .unwrap();
    let entries_before = h.cache_entries();

    let fresh = h.album("fresh", "flac", 44100, Some(16), 3);
    let plan = h.plan(&[built, fresh]);
    let summary = h.pipeline(config(2)).execute(&plan, true).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.count(JobStatus::Cached), 2);
    assert_eq!(summary.count(JobStatus::Pending), 3);
    assert_eq!(summary.stats.in_progress, 3);
    assert_eq!(h.encoder.encode_count().await, 2);
    assert_eq!(h.cache_entries(), entries_before);
    for job in plan.jobs.iter().filter(|j| j.group_id == "fresh") {
        assert!(!job.output_path.exists());
    }
}

// =============================================================================
// Failures and cancellation
// =============================================================================

#[tokio::test]
async fn test_failure_is_isolated_and_not_cached() {
    let h = TestHarness::new();
    let group = h.album("cd", "flac", 44100, Some(16), 4);
    let broken = group.items[2].path().to_path_buf();
    h.encoder.fail_source(&broken).await;
    let plan = h.plan(&[group]);
    let pipeline = h.pipeline(config(2));

    let summary = pipeline.execute(&plan, false).await.unwrap();
    assert_eq!(summary.stats.completed, 3);
    assert_eq!(summary.stats.failed, 1);
    assert!(summary.has_failures());

    let failed: Vec<_> = summary.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_path, broken);
    let failure = failed[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Encode);
    assert!(failure.message.contains("Invalid data found"));
    assert_eq!(h.cache_entries(), 3);

    // The failed job is attempted again on the next run; the others are cached.
    let again = pipeline.execute(&plan, false).await.unwrap();
    assert_eq!(again.stats.cached, 3);
    assert_eq!(again.stats.failed, 1);
    assert_eq!(h.encoder.encode_count().await, 5);
}

#[tokio::test]
async fn test_fail_fast_stops_queued_jobs() {
    let h = TestHarness::new();
    let group = h.album("cd", "flac", 44100, Some(16), 6);
    for item in &group.items {
        h.encoder.fail_source(item.path()).await;
    }
    h.encoder.set_encode_duration(Duration::from_millis(50)).await;
    let plan = h.plan(&[group]);

    let summary = h
        .pipeline(config(1).with_fail_fast(true))
        .execute(&plan, false)
        .await
        .unwrap();

    assert!(summary.stats.failed >= 1);
    assert!(summary.stats.cancelled >= 4, "{:?}", summary.stats);
    assert_eq!(summary.stats.failed + summary.stats.cancelled, 6);
    assert_eq!(summary.stats.in_progress, 0);
    assert!(h.encoder.encode_count().await <= 2);
    assert_eq!(h.cache_entries(), 0);
}

#[tokio::test]
async fn test_without_fail_fast_every_job_runs() {
    let h = TestHarness::new();
    let group = h.album("cd", "flac", 44100, Some(16), 4);
    h.encoder.fail_source(group.items[0].path()).await;
    let plan = h.plan(&[group]);

    let summary = h.pipeline(config(1)).execute(&plan, false).await.unwrap();
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.stats.completed, 3);
    assert_eq!(summary.stats.cancelled, 0);
}

#[tokio::test]
async fn test_cancel_mid_encode_never_publishes_output() {
    let h = TestHarness::new();
    h.encoder.set_encode_duration(Duration::from_millis(200)).await;
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 2)]);
    let pipeline = h.pipeline(config(2));

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let summary = pipeline.execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.cancelled, 2);
    assert_eq!(summary.stats.completed, 0);
    for job in &plan.jobs {
        assert!(!job.output_path.exists());
        assert!(!temp_path_of(&job.output_path).exists());
    }
    assert_eq!(h.cache_entries(), 0);
}

#[tokio::test]
async fn test_verification_failure_leaves_nothing_behind() {
    let h = TestHarness::new();
    h.encoder.set_reported_codec(Some("flac".to_string())).await;
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 2)]);

    let summary = h.pipeline(config(2)).execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.failed, 2);
    for report in summary.failures() {
        assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::Verification);
    }
    for job in &plan.jobs {
        assert!(!job.output_path.exists());
        assert!(!temp_path_of(&job.output_path).exists());
    }
    assert_eq!(h.tag_writer.recorded_writes().await.len(), 0);
    assert_eq!(h.cache_entries(), 0);
}

#[tokio::test]
async fn test_tag_write_failure_reported() {
    let h = TestHarness::new();
    h.tag_writer.set_next_error("disk quota exceeded").await;
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 1)]);

    let summary = h.pipeline(config(1)).execute(&plan, false).await.unwrap();

    let failure = summary.jobs[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::TagWrite);
    assert!(failure.message.contains("disk quota exceeded"));
    assert!(!plan.jobs[0].output_path.exists());
}

/// Encoder that panics, standing in for a crashed worker.
struct PanickingEncoder;

#[async_trait]
impl Encoder for PanickingEncoder {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn encode(
        &self,
        spec: &EncodeSpec,
        _progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<(), EncodeError> {
        std::fs::write(&spec.dest_path, b"partial").ok();
        panic!("encoder crashed");
    }
}

#[tokio::test]
async fn test_worker_panic_becomes_io_failure() {
    let h = TestHarness::new();
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 2)]);

    let summary = h
        .pipeline_with_encoder(config(2), Arc::new(PanickingEncoder))
        .execute(&plan, false)
        .await
        .unwrap();

    assert_eq!(summary.stats.failed, 2);
    for report in summary.failures() {
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Io);
        assert!(failure.message.contains("encoder crashed"));
    }
    for job in &plan.jobs {
        assert!(!job.output_path.exists());
        assert!(!temp_path_of(&job.output_path).exists());
    }
}

// =============================================================================
// Passthrough, concurrency and events
// =============================================================================

#[tokio::test]
async fn test_passthrough_copies_without_encoding() {
    let h = TestHarness::new();
    let plan = h.plan(&[h.album("mp3s", "mp3", 44100, None, 3)]);

    let summary = h.pipeline(config(2)).execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.completed, 3);
    assert_eq!(h.encoder.encode_count().await, 0);
    for job in &plan.jobs {
        assert!(job.output_path.to_string_lossy().ends_with("[MP3].mp3"));
        assert_eq!(
            std::fs::read(&job.output_path).unwrap(),
            std::fs::read(&job.source_path).unwrap()
        );
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let h = TestHarness::new();
    h.encoder.set_encode_duration(Duration::from_millis(30)).await;
    let plan = h.plan(&[h.album("cd", "flac", 44100, Some(16), 8)]);

    let summary = h.pipeline(config(3)).execute(&plan, false).await.unwrap();

    assert_eq!(summary.stats.completed, 8);
    assert!(h.encoder.max_concurrency() <= 3);
    assert!(h.encoder.max_concurrency() >= 1);
}

#[tokio::test]
async fn test_event_stream_accounts_for_every_job() {
    let h = TestHarness::new();
    let built = h.album("built", "flac", 44100, Some(16), 2);
    h.pipeline(config(2))
        .execute(&h.plan(&[built.clone()]), false)
        .await
        .unwrap();

    let group = h.album("fresh", "flac", 44100, Some(16), 3);
    h.encoder.fail_source(group.items[0].path()).await;
    let plan = h.plan(&[built, group]);

    let (tx, mut rx) = mpsc::channel(256);
    let pipeline = h.pipeline(config(2)).with_events(tx);
    pipeline.execute(&plan, false).await.unwrap();
    drop(pipeline);

    let mut cached = 0;
    let mut completed = 0;
    let mut failed = 0;
    let mut run_completed = None;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::JobCached { .. } => cached += 1,
            PipelineEvent::JobCompleted { .. } => completed += 1,
            PipelineEvent::JobFailed { kind, .. } => {
                assert_eq!(kind, FailureKind::Encode);
                failed += 1;
            }
            PipelineEvent::RunCompleted { stats } => run_completed = Some(stats),
            _ => {}
        }
    }

    assert_eq!((cached, completed, failed), (2, 2, 1));
    let stats = run_completed.expect("run completed event");
    assert_eq!(stats.total, 5);
    assert_eq!(stats.in_progress, 0);
}
