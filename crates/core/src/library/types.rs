//! Types describing scanned source items.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Source audio format class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Flac,
    Wav,
    Aiff,
    Alac,
    Ape,
    WavPack,
    Shorten,
    Mp3,
    Aac,
    Ogg,
    Opus,
    Wma,
    Unknown,
}

impl SourceFormat {
    /// Whether the format stores audio without lossy compression.
    pub fn is_lossless(&self) -> bool {
        matches!(
            self,
            Self::Flac
                | Self::Wav
                | Self::Aiff
                | Self::Alac
                | Self::Ape
                | Self::WavPack
                | Self::Shorten
        )
    }

    /// Maps a file extension to a format. `m4a` is ambiguous and maps to
    /// `Unknown`; use [`SourceFormat::from_codec`] for MP4 containers.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "aif" | "aiff" => Self::Aiff,
            "ape" => Self::Ape,
            "wv" => Self::WavPack,
            "shn" => Self::Shorten,
            "mp3" => Self::Mp3,
            "aac" => Self::Aac,
            "ogg" | "oga" => Self::Ogg,
            "opus" => Self::Opus,
            "wma" => Self::Wma,
            _ => Self::Unknown,
        }
    }

    /// Maps an ffprobe codec name to a format.
    pub fn from_codec(codec: &str) -> Self {
        let codec = codec.to_ascii_lowercase();
        if codec.starts_with("pcm_") {
            return Self::Wav;
        }
        match codec.as_str() {
            "flac" => Self::Flac,
            "alac" => Self::Alac,
            "ape" => Self::Ape,
            "wavpack" => Self::WavPack,
            "shorten" => Self::Shorten,
            "mp3" | "mp3float" => Self::Mp3,
            "aac" => Self::Aac,
            "vorbis" => Self::Ogg,
            "opus" => Self::Opus,
            "wmav1" | "wmav2" | "wmapro" => Self::Wma,
            _ => Self::Unknown,
        }
    }
}

/// Identity of one specific version of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch.
    pub mtime_secs: f64,
    pub size_bytes: u64,
}

impl Fingerprint {
    /// Reads the current fingerprint of a file from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        let mtime_secs = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Self {
            path: path.to_path_buf(),
            mtime_secs,
            size_bytes: meta.len(),
        })
    }
}

/// Technical stream attributes of a source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalInfo {
    pub sample_rate: u32,
    /// Absent for lossy formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    pub channels: u8,
    pub duration_secs: f64,
}

/// Tags read from the item itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disc_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation: Option<bool>,
}

/// Immutable facts about one source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFacts {
    pub item_id: String,
    pub fingerprint: Fingerprint,
    pub format: SourceFormat,
    pub technical: TechnicalInfo,
    #[serde(default)]
    pub tags: ItemTags,
}

impl ItemFacts {
    pub fn path(&self) -> &Path {
        &self.fingerprint.path
    }
}

/// Metadata shared by every item of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub is_compilation: bool,
    /// Artwork files found next to the items, in preference order.
    pub artwork_candidates: Vec<PathBuf>,
}

/// A set of items that share one decision, typically an album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGroup {
    pub group_id: String,
    pub source_dir: PathBuf,
    #[serde(default)]
    pub items: Vec<ItemFacts>,
    #[serde(default)]
    pub metadata: GroupMetadata,
}

impl ItemGroup {
    /// Distinct source formats across all items.
    pub fn source_formats(&self) -> BTreeSet<SourceFormat> {
        self.items.iter().map(|i| i.format).collect()
    }

    pub fn max_sample_rate(&self) -> Option<u32> {
        self.items.iter().map(|i| i.technical.sample_rate).max()
    }

    pub fn max_bit_depth(&self) -> Option<u8> {
        self.items.iter().filter_map(|i| i.technical.bit_depth).max()
    }

    /// True when every item is already in the passthrough format.
    pub fn is_passthrough_only(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.format == SourceFormat::Mp3)
    }

    pub fn has_lossless(&self) -> bool {
        self.items.iter().any(|i| i.format.is_lossless())
    }
}
