//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::debug;

use super::config::EncoderConfig;
use super::error::EncodeError;
use super::traits::Encoder;
use super::types::{EncodeProgress, EncodeSpec};
use crate::resolver::CodecClass;

/// Attenuation applied before a multichannel downmix.
const DOWNMIX_HEADROOM: &str = "volume=-3dB";

/// FFmpeg-based encoder.
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    /// Creates a new FFmpeg encoder with the given configuration.
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// Checks that the ffmpeg binary can be executed.
    pub async fn validate(&self) -> Result<(), EncodeError> {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;
        Ok(())
    }

    fn spawn_error(&self, e: std::io::Error) -> EncodeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EncodeError::EncoderNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            EncodeError::Io(e)
        }
    }

    /// Builds the `-af` filter chain: headroom, then resample/dither.
    fn build_filters(spec: &EncodeSpec) -> Vec<String> {
        let mut filters = Vec::new();

        if spec.downmix {
            filters.push(DOWNMIX_HEADROOM.to_string());
        }

        if spec.resample || spec.dither {
            let mut resample = format!(
                "aresample={}:resampler=soxr:precision=28",
                spec.sample_rate
            );
            if spec.dither {
                resample.push_str(":dither_method=triangular_hp");
            }
            filters.push(resample);
        }

        filters
    }

    /// Builds ffmpeg arguments for one encode.
    fn build_args(&self, spec: &EncodeSpec) -> Result<Vec<String>, EncodeError> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            spec.source_path.to_string_lossy().to_string(),
            "-vn".to_string(),
        ];

        match spec.codec {
            CodecClass::Copy => {
                args.extend(["-c:a".to_string(), "copy".to_string()]);
            }
            CodecClass::Alac => {
                let filters = Self::build_filters(spec);
                if !filters.is_empty() {
                    args.extend(["-af".to_string(), filters.join(",")]);
                }
                args.extend([
                    "-ac".to_string(),
                    "2".to_string(),
                    "-c:a".to_string(),
                    "alac".to_string(),
                    "-ar".to_string(),
                    spec.sample_rate.to_string(),
                ]);
                match spec.bit_depth {
                    Some(bd) if bd <= 16 => {
                        args.extend(["-sample_fmt".to_string(), "s16p".to_string()]);
                    }
                    Some(bd) if bd <= 24 => {
                        args.extend(["-sample_fmt".to_string(), "s32p".to_string()]);
                    }
                    Some(bd) => {
                        return Err(EncodeError::Unsupported {
                            reason: format!("ALAC cannot store {}-bit samples", bd),
                        })
                    }
                    None => {}
                }
            }
            CodecClass::Aac => {
                let bitrate = spec.bitrate_kbps.ok_or_else(|| EncodeError::Unsupported {
                    reason: "AAC encode without a bitrate".to_string(),
                })?;
                // Dither is meaningless for AAC; only headroom and rate apply.
                let filters = Self::build_filters(&EncodeSpec {
                    dither: false,
                    ..spec.clone()
                });
                if !filters.is_empty() {
                    args.extend(["-af".to_string(), filters.join(",")]);
                }
                args.extend([
                    "-ac".to_string(),
                    "2".to_string(),
                    "-c:a".to_string(),
                    "aac".to_string(),
                    "-profile:a".to_string(),
                    "aac_low".to_string(),
                    "-b:a".to_string(),
                    format!("{}k", bitrate),
                    "-ar".to_string(),
                    spec.sample_rate.to_string(),
                ]);
            }
        }

        // Log level
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);

        // Progress output for parsing
        args.extend(["-progress".to_string(), "pipe:2".to_string()]);

        args.push(spec.dest_path.to_string_lossy().to_string());

        Ok(args)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<(), EncodeError> {
        let args = self.build_args(spec)?;
        debug!(job_id = %spec.job_id, ?args, "Running ffmpeg");

        // The child is killed if this future is dropped (timeout or abort).
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncodeError::failed("stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let mut last_progress_send = Instant::now();
        let progress_interval = Duration::from_millis(500);
        let mut error_output = String::new();

        while let Some(line) = reader.next_line().await? {
            if line.contains("Error") || line.contains("error") {
                error_output.push_str(&line);
                error_output.push('\n');
            }

            let current_time = time_regex
                .as_ref()
                .and_then(|re| re.captures(&line))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                // out_time_ms is in microseconds
                .map(|us| us / 1_000_000.0);

            if let (Some(tx), Some(time_secs)) = (progress_tx.as_ref(), current_time) {
                if last_progress_send.elapsed() >= progress_interval {
                    let percent = match spec.duration_secs {
                        Some(dur) if dur > 0.0 => (time_secs / dur * 100.0).min(100.0) as f32,
                        _ => 0.0,
                    };
                    // Non-blocking send
                    let _ = tx.try_send(EncodeProgress {
                        job_id: spec.job_id.clone(),
                        percent,
                        time_secs,
                    });
                    last_progress_send = Instant::now();
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EncodeError::failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                (!error_output.is_empty()).then_some(error_output),
            ));
        }

        Ok(())
    }
}
