//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the converter's external
//! tool traits, allowing pipeline runs without FFmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use podbuild_core::testing::{MockEncoder, MockProber, MockTagWriter};
//!
//! let encoder = MockEncoder::new();
//! let transcoder = Transcoder::new(
//!     Arc::new(encoder.clone()),
//!     Arc::new(MockProber::new()),
//!     Arc::new(MockTagWriter::new()),
//! );
//!
//! // Configure mock behavior
//! encoder.fail_source("/music/a/02.flac").await;
//! ```

mod mock_encoder;
mod mock_prober;
mod mock_tag_writer;

pub use mock_encoder::MockEncoder;
pub use mock_prober::MockProber;
pub use mock_tag_writer::{MockTagWriter, RecordedTagWrite};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::time::UNIX_EPOCH;

    use crate::converter::ProbeInfo;
    use crate::library::{
        Fingerprint, GroupMetadata, ItemFacts, ItemGroup, ItemTags, SourceFormat, TechnicalInfo,
    };
    use crate::resolver::{
        settings_hash, Action, CodecClass, Job, TagPayload, TargetParameters, TOOL_VERSION,
    };

    /// A fixed mtime for fingerprints that never touch disk.
    pub const FIXED_MTIME: f64 = 1_700_000_000.25;

    /// Create a Preserve job (16-bit/44.1kHz ALAC) with reasonable defaults.
    pub fn job(source: &str, output: &str) -> Job {
        let fingerprint = Fingerprint {
            path: PathBuf::from(source),
            mtime_secs: FIXED_MTIME,
            size_bytes: 30 * 1024 * 1024,
        };
        let target = TargetParameters {
            sample_rate: 44100,
            bit_depth: Some(16),
            dither: false,
            resample: false,
        };
        let settings_hash = settings_hash(
            &fingerprint,
            Action::Preserve,
            None,
            target.sample_rate,
            target.bit_depth,
            TOOL_VERSION,
        );
        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Job {
            job_id: format!("job-{}", stem),
            group_id: "group-1".to_string(),
            source_path: PathBuf::from(source),
            output_path: PathBuf::from(output),
            action: Action::Preserve,
            codec: CodecClass::Alac,
            source_sample_rate: 44100,
            source_bit_depth: Some(16),
            source_channels: 2,
            source_duration_secs: 180.0,
            target,
            bitrate_kbps: None,
            downmix: false,
            tags: TagPayload {
                title: Some(stem),
                artist: Some("Test Artist".to_string()),
                album: Some("Test Album".to_string()),
                track_number: Some(1),
                track_total: Some(10),
                year: Some(2024),
                ..Default::default()
            },
            artwork: None,
            fingerprint,
            settings_hash,
        }
    }

    /// JSON understood by [`super::MockProber`], describing a media file.
    pub fn probe_json(codec: &str, sample_rate: u32) -> String {
        let info = ProbeInfo {
            format_name: codec.to_string(),
            codec: Some(codec.to_string()),
            sample_rate: Some(sample_rate),
            bit_depth: None,
            channels: Some(2),
            duration_secs: Some(180.0),
        };
        serde_json::to_string(&info).unwrap_or_default()
    }

    /// Create item facts that do not exist on disk.
    pub fn item(path: &str, sample_rate: u32, bit_depth: Option<u8>) -> ItemFacts {
        let path = PathBuf::from(path);
        let format = path
            .extension()
            .map(|e| SourceFormat::from_extension(&e.to_string_lossy()))
            .unwrap_or(SourceFormat::Unknown);
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        ItemFacts {
            item_id: path.display().to_string(),
            fingerprint: Fingerprint {
                path,
                mtime_secs: FIXED_MTIME,
                size_bytes: 30 * 1024 * 1024,
            },
            format,
            technical: TechnicalInfo {
                sample_rate,
                bit_depth: if format.is_lossless() { bit_depth } else { None },
                channels: 2,
                duration_secs: 180.0,
            },
            tags: ItemTags {
                title,
                ..Default::default()
            },
        }
    }

    /// Create a group with artist/album metadata around the given items.
    pub fn group(group_id: &str, items: Vec<ItemFacts>) -> ItemGroup {
        let source_dir = items
            .first()
            .and_then(|i| i.path().parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("/music").join(group_id));

        ItemGroup {
            group_id: group_id.to_string(),
            source_dir,
            items,
            metadata: GroupMetadata {
                artist: Some("Test Artist".to_string()),
                album: Some(group_id.to_string()),
                year: Some(2024),
                ..Default::default()
            },
        }
    }

    /// Write a source file readable by [`super::MockProber`] and return its facts.
    pub fn write_source(path: &Path, sample_rate: u32, bit_depth: Option<u8>) -> ItemFacts {
        let codec = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create source dir");
        }
        std::fs::write(path, probe_json(&codec, sample_rate)).expect("write source");

        let mut facts = item(&path.to_string_lossy(), sample_rate, bit_depth);
        facts.fingerprint = fingerprint_of(path);
        facts
    }

    /// Read a fingerprint synchronously.
    pub fn fingerprint_of(path: &Path) -> Fingerprint {
        let meta = std::fs::metadata(path).expect("stat source");
        let mtime_secs = meta
            .modified()
            .expect("mtime")
            .duration_since(UNIX_EPOCH)
            .expect("mtime after epoch")
            .as_secs_f64();
        Fingerprint {
            path: path.to_path_buf(),
            mtime_secs,
            size_bytes: meta.len(),
        }
    }

    /// Create an album of `tracks` source files on disk under `root/group_id`.
    pub fn album_on_disk(
        root: &Path,
        group_id: &str,
        extension: &str,
        sample_rate: u32,
        bit_depth: Option<u8>,
        tracks: u32,
    ) -> ItemGroup {
        let dir = root.join(group_id);
        let items = (1..=tracks)
            .map(|n| {
                let path = dir.join(format!("{:02} Track {}.{}", n, n, extension));
                let mut facts = write_source(&path, sample_rate, bit_depth);
                facts.tags.track_number = Some(n);
                facts.tags.track_total = Some(tracks);
                facts.tags.title = Some(format!("Track {}", n));
                facts
            })
            .collect();
        group(group_id, items)
    }
}
