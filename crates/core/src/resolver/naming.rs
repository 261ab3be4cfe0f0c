//! Output naming.

use std::path::{Path, PathBuf};

use super::action::{Action, TargetParameters};
use crate::library::{ItemFacts, ItemGroup};

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes a free-text value safe to use as one path component.
pub fn sanitize_component(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = replaced
        .trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Short tag appended to file names, e.g. `[AAC-256k]` or `[ALAC-16-44.1]`.
pub fn conversion_tag(
    action: Action,
    bitrate_kbps: Option<u32>,
    source_sample_rate: u32,
    source_bit_depth: Option<u8>,
    target: &TargetParameters,
) -> String {
    match action {
        Action::Passthrough => "[MP3]".to_string(),
        Action::LossyEncode => format!("[AAC-{}k]", bitrate_kbps.unwrap_or_default()),
        Action::Preserve | Action::Downconvert => {
            if target.is_reduced(source_sample_rate, source_bit_depth) {
                format!(
                    "[ALAC-{}-{}]",
                    target.bit_depth.unwrap_or_default(),
                    format_khz(target.sample_rate)
                )
            } else {
                "[ALAC]".to_string()
            }
        }
        Action::Skip => String::new(),
    }
}

fn format_khz(sample_rate: u32) -> String {
    if sample_rate % 1000 == 0 {
        (sample_rate / 1000).to_string()
    } else {
        format!("{:.1}", sample_rate as f64 / 1000.0)
    }
}

/// Deterministic output path for one item.
///
/// Layout: `<root>/<album artist>/<year - album>/<disc->NN title [TAG].ext`.
pub fn output_path(
    root: &Path,
    group: &ItemGroup,
    item: &ItemFacts,
    action: Action,
    extension: &str,
    bitrate_kbps: Option<u32>,
    target: &TargetParameters,
) -> PathBuf {
    let meta = &group.metadata;
    let artist = meta
        .album_artist
        .as_deref()
        .or(meta.artist.as_deref())
        .unwrap_or("Unknown Artist");
    let album = meta.album.as_deref().unwrap_or("Unknown Album");

    let album_dir = match meta.year.filter(|y| *y > 0) {
        Some(year) => format!("{} - {}", year, sanitize_component(album)),
        None => sanitize_component(album),
    };

    let title = item.tags.title.clone().unwrap_or_else(|| {
        item.path()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    });
    let track = item.tags.track_number.unwrap_or(0);
    let disc_prefix = if meta.is_compilation || item.tags.disc_total.is_some_and(|t| t > 1) {
        format!("{}-", item.tags.disc_number.unwrap_or(1))
    } else {
        String::new()
    };

    let tag = conversion_tag(
        action,
        bitrate_kbps,
        item.technical.sample_rate,
        item.technical.bit_depth,
        target,
    );
    let file_name = format!(
        "{}{:02} {} {}.{}",
        disc_prefix,
        track,
        sanitize_component(&title),
        tag,
        extension
    );

    root.join(sanitize_component(artist))
        .join(album_dir)
        .join(file_name)
}
