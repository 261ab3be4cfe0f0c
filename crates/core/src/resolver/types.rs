//! Types produced by plan resolution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::action::{Action, CodecClass, TargetParameters};
use super::error::GroupValidationError;
use crate::library::Fingerprint;

/// A user decision for one item group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Decision {
    /// Free-text action; empty means no override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_action: Option<String>,
    #[serde(alias = "bitrate", skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    pub skip: bool,
}

impl Decision {
    pub fn with_action(action: impl Into<String>) -> Self {
        Self {
            user_action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Default::default()
        }
    }

    /// Trimmed action override, if any.
    pub fn action_override(&self) -> Option<&str> {
        self.user_action
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Where a resolved action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Default,
    UserOverride,
}

/// Final action for a group. Computed each run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub group_id: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    pub skip: bool,
    pub provenance: Provenance,
}

/// Tags written into an output artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagPayload {
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
    pub compilation: bool,
}

impl TagPayload {
    /// Converts to ffmpeg `-metadata` arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut pairs: Vec<(&str, String)> = Vec::new();

        if let Some(ref title) = self.title {
            pairs.push(("title", title.clone()));
        }
        if let Some(ref artist) = self.artist {
            pairs.push(("artist", artist.clone()));
        }
        if let Some(ref album) = self.album {
            pairs.push(("album", album.clone()));
        }
        if let Some(ref album_artist) = self.album_artist {
            pairs.push(("album_artist", album_artist.clone()));
        }
        if let Some(year) = self.year {
            pairs.push(("date", year.to_string()));
        }
        if let Some(track) = self.track_number {
            let value = match self.track_total {
                Some(total) => format!("{}/{}", track, total),
                None => track.to_string(),
            };
            pairs.push(("track", value));
        }
        if let Some(disc) = self.disc_number {
            let value = match self.disc_total {
                Some(total) => format!("{}/{}", disc, total),
                None => disc.to_string(),
            };
            pairs.push(("disc", value));
        }
        if self.compilation {
            pairs.push(("compilation", "1".to_string()));
        }

        pairs
            .into_iter()
            .flat_map(|(key, value)| ["-metadata".to_string(), format!("{}={}", key, value)])
            .collect()
    }
}

/// One unit of work: a single source item and everything needed to build it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub group_id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub action: Action,
    pub codec: CodecClass,
    pub source_sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_bit_depth: Option<u8>,
    pub source_channels: u8,
    pub source_duration_secs: f64,
    pub target: TargetParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    /// Source has more channels than the stereo output.
    pub downmix: bool,
    pub tags: TagPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork: Option<PathBuf>,
    pub fingerprint: Fingerprint,
    pub settings_hash: String,
}

/// Ordered jobs plus what was left out and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub jobs: Vec<Job>,
    pub skipped_groups: Vec<String>,
    pub validation_errors: Vec<GroupValidationError>,
}

impl BuildPlan {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn total_source_bytes(&self) -> u64 {
        self.jobs.iter().map(|j| j.fingerprint.size_bytes).sum()
    }

    /// Distinct group ids that produced jobs.
    pub fn group_count(&self) -> usize {
        let mut ids: Vec<&str> = self.jobs.iter().map(|j| j.group_id.as_str()).collect();
        ids.dedup();
        ids.len()
    }
}
