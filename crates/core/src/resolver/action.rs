//! Actions, their behavior profiles, and target parameter computation.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ValidationError;
use super::policy::Policy;
use crate::library::ItemGroup;

/// What to do with an item group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Lossless output at source resolution, capped at the ceiling.
    Preserve,
    /// Lossless output reduced to the ceiling.
    Downconvert,
    /// Lossy encode at a bitrate from the allow-list.
    LossyEncode,
    /// Copy the source stream unchanged.
    Passthrough,
    /// Produce nothing.
    Skip,
}

/// Codec family an output is encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecClass {
    Alac,
    Aac,
    /// Stream copy without re-encoding.
    Copy,
}

impl CodecClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alac => "alac",
            Self::Aac => "aac",
            Self::Copy => "copy",
        }
    }

    /// Codec names a verified artifact may report for this class.
    pub fn allowed_codecs(&self) -> &'static [&'static str] {
        match self {
            Self::Alac => &["alac"],
            Self::Aac => &["aac"],
            Self::Copy => &["mp3", "mp3float"],
        }
    }
}

impl fmt::Display for CodecClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the target sample rate is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateRule {
    Source,
    /// min(source, ceiling)
    Ceiling,
}

/// How the target bit depth is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthRule {
    Source,
    /// min(source, ceiling); sources without a depth get the ceiling.
    Ceiling,
    /// Bit depth does not apply to the output codec.
    Dropped,
}

/// When dither is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherRule {
    Never,
    OnDepthReduction,
}

/// Behavior of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionProfile {
    pub codec: CodecClass,
    pub extension: &'static str,
    pub sample_rate: RateRule,
    pub bit_depth: DepthRule,
    pub dither: DitherRule,
    pub needs_bitrate: bool,
}

const LOSSLESS: ActionProfile = ActionProfile {
    codec: CodecClass::Alac,
    extension: "m4a",
    sample_rate: RateRule::Ceiling,
    bit_depth: DepthRule::Ceiling,
    dither: DitherRule::OnDepthReduction,
    needs_bitrate: false,
};

const LOSSY: ActionProfile = ActionProfile {
    codec: CodecClass::Aac,
    extension: "m4a",
    sample_rate: RateRule::Ceiling,
    bit_depth: DepthRule::Dropped,
    dither: DitherRule::Never,
    needs_bitrate: true,
};

const PASSTHROUGH: ActionProfile = ActionProfile {
    codec: CodecClass::Copy,
    extension: "mp3",
    sample_rate: RateRule::Source,
    bit_depth: DepthRule::Source,
    dither: DitherRule::Never,
    needs_bitrate: false,
};

impl Action {
    /// Behavior table. `Skip` has no output and therefore no profile.
    pub fn profile(&self) -> Option<ActionProfile> {
        match self {
            Self::Preserve | Self::Downconvert => Some(LOSSLESS),
            Self::LossyEncode => Some(LOSSY),
            Self::Passthrough => Some(PASSTHROUGH),
            Self::Skip => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Downconvert => "downconvert",
            Self::LossyEncode => "lossy_encode",
            Self::Passthrough => "passthrough",
            Self::Skip => "skip",
        }
    }

    pub fn all() -> [Action; 5] {
        [
            Self::Preserve,
            Self::Downconvert,
            Self::LossyEncode,
            Self::Passthrough,
            Self::Skip,
        ]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a user-supplied action string.
///
/// Matching ignores case and any non-alphanumeric characters, so
/// `alac_16/44`, `ALAC-16-44` and `Alac 16 44` are the same action.
pub fn parse_action(value: &str) -> Result<Action, ValidationError> {
    let normalized: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let action = match normalized.as_str() {
        "ALAC" | "ALACPRESERVE" | "PRESERVE" | "LOSSLESS" => Action::Preserve,
        "ALAC1644" | "ALACREDBOOK" | "REDBOOK" | "DOWNCONVERT" => Action::Downconvert,
        "AAC" | "LOSSY" | "LOSSYENCODE" | "ENCODE" => Action::LossyEncode,
        "PASSMP3" | "MP3" | "PASS" | "PASSTHROUGH" | "COPY" => Action::Passthrough,
        "SKIP" | "NONE" | "IGNORE" => Action::Skip,
        _ => {
            return Err(ValidationError::InvalidAction {
                value: value.to_string(),
            })
        }
    };
    Ok(action)
}

/// Computes the action a group gets without any user override.
pub fn compute_default_action(group: &ItemGroup, policy: &Policy) -> Action {
    let formats = group.source_formats();
    if formats.is_empty() {
        return Action::Skip;
    }
    if group.is_passthrough_only() {
        return Action::Passthrough;
    }
    if formats.iter().any(|f| f.is_lossless()) {
        let exceeds = group
            .items
            .iter()
            .filter(|i| i.format.is_lossless())
            .any(|i| policy.exceeds_ceiling(i.technical.sample_rate, i.technical.bit_depth));
        return if exceeds {
            Action::Downconvert
        } else {
            Action::Preserve
        };
    }
    Action::LossyEncode
}

/// Technical parameters a job encodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetParameters {
    pub sample_rate: u32,
    pub bit_depth: Option<u8>,
    pub dither: bool,
    pub resample: bool,
}

impl TargetParameters {
    /// Whether either dimension is lower than the source.
    pub fn is_reduced(&self, source_sample_rate: u32, source_bit_depth: Option<u8>) -> bool {
        let depth_reduced = matches!(
            (source_bit_depth, self.bit_depth),
            (Some(src), Some(dst)) if dst < src
        );
        self.sample_rate < source_sample_rate || depth_reduced
    }
}

/// Applies the never-upconvert policy for one item.
///
/// Returns `None` for `Skip`.
pub fn compute_target_parameters(
    source_sample_rate: u32,
    source_bit_depth: Option<u8>,
    action: Action,
    policy: &Policy,
) -> Option<TargetParameters> {
    let profile = action.profile()?;

    let sample_rate = match profile.sample_rate {
        RateRule::Source => source_sample_rate,
        RateRule::Ceiling => source_sample_rate.min(policy.max_sample_rate),
    };

    let bit_depth = match profile.bit_depth {
        DepthRule::Source => source_bit_depth,
        DepthRule::Ceiling => Some(
            source_bit_depth
                .map(|bd| bd.min(policy.max_bit_depth))
                .unwrap_or(policy.max_bit_depth),
        ),
        DepthRule::Dropped => None,
    };

    let depth_reduced = matches!(
        (source_bit_depth, bit_depth),
        (Some(src), Some(dst)) if dst < src
    );
    let dither = profile.dither == DitherRule::OnDepthReduction && depth_reduced;
    let resample = profile.codec != CodecClass::Copy && (sample_rate != source_sample_rate || dither);

    Some(TargetParameters {
        sample_rate,
        bit_depth,
        dither,
        resample,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{
        Fingerprint, GroupMetadata, ItemFacts, ItemTags, SourceFormat, TechnicalInfo,
    };
    use std::path::PathBuf;

    fn group(items: &[(SourceFormat, u32, Option<u8>)]) -> ItemGroup {
        ItemGroup {
            group_id: "g".to_string(),
            source_dir: PathBuf::from("/music/g"),
            items: items
                .iter()
                .enumerate()
                .map(|(i, (format, sr, bd))| ItemFacts {
                    item_id: format!("i{}", i),
                    fingerprint: Fingerprint {
                        path: PathBuf::from(format!("/music/g/{}.x", i)),
                        mtime_secs: 1.0,
                        size_bytes: 1,
                    },
                    format: *format,
                    technical: TechnicalInfo {
                        sample_rate: *sr,
                        bit_depth: *bd,
                        channels: 2,
                        duration_secs: 1.0,
                    },
                    tags: ItemTags::default(),
                })
                .collect(),
            metadata: GroupMetadata::default(),
        }
    }

    #[test]
    fn test_default_action_table() {
        let policy = Policy::default();
        assert_eq!(compute_default_action(&group(&[]), &policy), Action::Skip);
        assert_eq!(
            compute_default_action(&group(&[(SourceFormat::Mp3, 44100, None)]), &policy),
            Action::Passthrough
        );
        assert_eq!(
            compute_default_action(&group(&[(SourceFormat::Flac, 44100, Some(16))]), &policy),
            Action::Preserve
        );
        assert_eq!(
            compute_default_action(&group(&[(SourceFormat::Flac, 96000, Some(24))]), &policy),
            Action::Downconvert
        );
        assert_eq!(
            compute_default_action(&group(&[(SourceFormat::Ogg, 44100, None)]), &policy),
            Action::LossyEncode
        );
        // Mixed MP3 and lossless counts as lossless.
        assert_eq!(
            compute_default_action(
                &group(&[
                    (SourceFormat::Mp3, 44100, None),
                    (SourceFormat::Wav, 44100, Some(16))
                ]),
                &policy
            ),
            Action::Preserve
        );
    }

    #[test]
    fn test_default_action_respects_policy_ceiling() {
        let hires = group(&[(SourceFormat::Flac, 48000, Some(24))]);
        assert_eq!(
            compute_default_action(&hires, &Policy::default()),
            Action::Downconvert
        );
        assert_eq!(
            compute_default_action(&hires, &Policy::default().with_ceiling(48000, 24)),
            Action::Preserve
        );
    }

    #[test]
    fn test_parse_action_synonyms() {
        assert_eq!(parse_action("alac").unwrap(), Action::Preserve);
        assert_eq!(parse_action("ALAC_PRESERVE").unwrap(), Action::Preserve);
        assert_eq!(parse_action("alac_16/44").unwrap(), Action::Downconvert);
        assert_eq!(parse_action("ALAC-16-44").unwrap(), Action::Downconvert);
        assert_eq!(parse_action(" aac ").unwrap(), Action::LossyEncode);
        assert_eq!(parse_action("pass-mp3").unwrap(), Action::Passthrough);
        assert_eq!(parse_action("Passthrough").unwrap(), Action::Passthrough);
        assert_eq!(parse_action("none").unwrap(), Action::Skip);
    }

    #[test]
    fn test_parse_action_rejects_unknown() {
        let err = parse_action("vinyl").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAction { .. }));
        assert_eq!(err.code(), "INVALID_ENUM");
    }

    #[test]
    fn test_every_action_round_trips_through_parser() {
        for action in Action::all() {
            assert_eq!(parse_action(action.as_str()).unwrap(), action);
        }
    }

    #[test]
    fn test_target_preserve_redbook_source() {
        let policy = Policy::default();
        let t = compute_target_parameters(44100, Some(16), Action::Preserve, &policy).unwrap();
        assert_eq!(t.sample_rate, 44100);
        assert_eq!(t.bit_depth, Some(16));
        assert!(!t.dither);
        assert!(!t.resample);
    }

    #[test]
    fn test_target_downconvert_hires_source() {
        let policy = Policy::default();
        let t = compute_target_parameters(96000, Some(24), Action::Downconvert, &policy).unwrap();
        assert_eq!(t.sample_rate, 44100);
        assert_eq!(t.bit_depth, Some(16));
        assert!(t.dither);
        assert!(t.resample);
    }

    #[test]
    fn test_target_rate_only_reduction_has_no_dither() {
        let policy = Policy::default();
        let t = compute_target_parameters(48000, Some(16), Action::Preserve, &policy).unwrap();
        assert_eq!(t.sample_rate, 44100);
        assert!(!t.dither);
        assert!(t.resample);
    }

    #[test]
    fn test_target_passthrough_keeps_everything() {
        let policy = Policy::default();
        let t = compute_target_parameters(48000, None, Action::Passthrough, &policy).unwrap();
        assert_eq!(t.sample_rate, 48000);
        assert_eq!(t.bit_depth, None);
        assert!(!t.resample);
        assert!(!t.dither);
    }

    #[test]
    fn test_target_lossy_drops_depth() {
        let policy = Policy::default();
        let t = compute_target_parameters(96000, Some(24), Action::LossyEncode, &policy).unwrap();
        assert_eq!(t.sample_rate, 44100);
        assert_eq!(t.bit_depth, None);
        assert!(!t.dither);
    }

    #[test]
    fn test_target_lossy_source_to_lossless_gets_ceiling_depth() {
        let policy = Policy::default();
        let t = compute_target_parameters(44100, None, Action::Preserve, &policy).unwrap();
        assert_eq!(t.bit_depth, Some(16));
        assert!(!t.dither);
    }

    #[test]
    fn test_target_skip_is_none() {
        assert!(compute_target_parameters(44100, Some(16), Action::Skip, &Policy::default()).is_none());
    }

    #[test]
    fn test_never_upconvert_grid() {
        let policies = [Policy::default(), Policy::default().with_ceiling(48000, 24)];
        let rates = [8000, 22050, 44100, 48000, 88200, 96000, 192000];
        let depths = [None, Some(8), Some(16), Some(24), Some(32)];
        for policy in &policies {
            for action in Action::all() {
                for &sr in &rates {
                    for &bd in &depths {
                        let Some(t) = compute_target_parameters(sr, bd, action, policy) else {
                            continue;
                        };
                        assert!(t.sample_rate <= sr, "{action} {sr} -> {}", t.sample_rate);
                        if let (Some(src), Some(dst)) = (bd, t.bit_depth) {
                            assert!(dst <= src, "{action} {src} -> {dst}");
                        }
                        if t.dither {
                            assert!(t.resample);
                        }
                    }
                }
            }
        }
    }
}
