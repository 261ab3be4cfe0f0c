//! FFmpeg-based tag writer.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::config::EncoderConfig;
use super::error::TagWriteError;
use super::traits::TagWriter;
use crate::resolver::TagPayload;

/// Image type detected from artwork bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkKind {
    Jpeg,
    Png,
}

impl ArtworkKind {
    /// Detects the image type from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
        const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        if bytes.starts_with(JPEG) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG) {
            Some(Self::Png)
        } else {
            None
        }
    }

    /// Like [`Self::sniff`], but unrecognized bytes are handed to ffmpeg as
    /// JPEG, which probes the real format itself.
    pub fn sniff_or_jpeg(bytes: &[u8]) -> Self {
        Self::sniff(bytes).unwrap_or_else(|| {
            warn!(len = bytes.len(), "Unrecognized artwork format, treating as JPEG");
            Self::Jpeg
        })
    }

        pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Rewrites tags by remuxing into a sibling file and renaming it back.
pub struct FfmpegTagWriter {
    config: EncoderConfig,
}

impl FfmpegTagWriter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// `<dir>/<stem>.tag.<ext>`, next to the artifact.
    fn remux_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!("{}.tag.{}", stem, ext))
    }

    fn build_args(
        &self,
        input: &Path,
        output: &Path,
        tags: &TagPayload,
        artwork_path: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        match artwork_path {
            Some(cover) => args.extend([
                "-i".to_string(),
                cover.to_string_lossy().to_string(),
                "-map".to_string(),
                "0:a".to_string(),
                "-map".to_string(),
                "1:v".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-disposition:v:0".to_string(),
                "attached_pic".to_string(),
            ]),
            None => args.extend(["-map".to_string(), "0:a".to_string()]),
        }

        args.extend(["-c:a".to_string(), "copy".to_string()]);
        args.extend(tags.to_ffmpeg_args());

        if output.extension().is_some_and(|e| e == "mp3") {
            args.extend(["-id3v2_version".to_string(), "3".to_string()]);
        }

        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl TagWriter for FfmpegTagWriter {
    async fn write_tags(
        &self,
        path: &Path,
        tags: &TagPayload,
        artwork: Option<&[u8]>,
    ) -> Result<(), TagWriteError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        // Kept alive until ffmpeg has read it; deleted on drop.
        let artwork_file = match artwork {
            Some(bytes) => {
                let kind = ArtworkKind::sniff_or_jpeg(bytes);
                let mut file = tempfile::Builder::new()
                    .prefix(".cover")
                    .suffix(&format!(".{}", kind.extension()))
                    .tempfile_in(dir)?;
                file.write_all(bytes)?;
                file.flush()?;
                Some(file)
            }
            None => None,
        };

        let remuxed = Self::remux_path(path);
        let args = self.build_args(
            path,
            &remuxed,
            tags,
            artwork_file.as_ref().map(|f| f.path()),
        );
        debug!(path = %path.display(), "Writing tags");

        let output = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let _ = tokio::fs::remove_file(&remuxed).await;
                return Err(TagWriteError::Io(e));
            }
        };

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&remuxed).await;
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TagWriteError::failed(
                format!("FFmpeg exited with code: {:?}", output.status.code()),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }

        if let Err(e) = tokio::fs::rename(&remuxed, path).await {
            let _ = tokio::fs::remove_file(&remuxed).await;
            return Err(TagWriteError::Io(e));
        }

        Ok(())
    }
}
