//! FFprobe-based prober implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use super::config::EncoderConfig;
use super::error::ProbeError;
use super::traits::Prober;
use super::types::ProbeInfo;

/// Reads stream attributes with `ffprobe -print_format json`.
pub struct FfprobeProber {
    config: EncoderConfig,
}

impl FfprobeProber {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// Parses ffprobe JSON output into ProbeInfo.
    pub(crate) fn parse_probe_output(output: &str) -> Result<ProbeInfo, ProbeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            sample_rate: Option<String>,
            channels: Option<u8>,
            bits_per_sample: Option<u32>,
            bits_per_raw_sample: Option<String>,
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| ProbeError::Parse {
            reason: format!("Failed to parse ffprobe output: {}", e),
        })?;

        let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

        let bit_depth = audio.and_then(|s| {
            s.bits_per_sample
                .filter(|b| *b > 0)
                .or_else(|| {
                    s.bits_per_raw_sample
                        .as_ref()
                        .and_then(|b| b.parse::<u32>().ok())
                        .filter(|b| *b > 0)
                })
                .and_then(|b| u8::try_from(b).ok())
        });

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .or_else(|| audio.and_then(|s| s.duration.as_ref()))
            .and_then(|d| d.parse::<f64>().ok());

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        Ok(ProbeInfo {
            format_name,
            codec: audio.and_then(|s| s.codec_name.clone()),
            sample_rate: audio
                .and_then(|s| s.sample_rate.as_ref())
                .and_then(|r| r.parse::<u32>().ok()),
            bit_depth,
            channels: audio.and_then(|s| s.channels),
            duration_secs,
        })
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, ProbeError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ProberNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ProbeError::failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(&stdout)
    }
}
