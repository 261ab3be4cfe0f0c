use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::DEFAULT_CACHE_FILE;
use crate::converter::EncoderConfig;
use crate::pipeline::{default_concurrency, PipelineConfig};
use crate::resolver::Policy;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolution policy for this configuration.
    pub fn policy(&self) -> Policy {
        Policy {
            max_sample_rate: self.policy.max_sample_rate,
            max_bit_depth: self.policy.max_bit_depth,
            default_bitrate_kbps: self.policy.default_bitrate_kbps,
            allowed_bitrates: self.policy.allowed_bitrates.clone(),
            output_root: self.build.output_root.clone(),
            ..Policy::default()
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.build.concurrency,
            fail_fast: self.build.fail_fast,
            force: self.build.force,
        }
    }
}

/// Build run configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BuildConfig {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub force: bool,
    /// Cache file name, relative to the output root.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            concurrency: default_concurrency(),
            fail_fast: false,
            force: false,
            cache_file: default_cache_file(),
        }
    }
}

impl BuildConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.output_root.join(&self.cache_file)
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

/// Quality ceiling and bitrate policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_sample_rate")]
    pub max_sample_rate: u32,
    #[serde(default = "default_max_bit_depth")]
    pub max_bit_depth: u8,
    #[serde(default = "default_bitrate")]
    pub default_bitrate_kbps: u32,
    #[serde(default = "default_allowed_bitrates")]
    pub allowed_bitrates: Vec<u32>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_sample_rate: default_max_sample_rate(),
            max_bit_depth: default_max_bit_depth(),
            default_bitrate_kbps: default_bitrate(),
            allowed_bitrates: default_allowed_bitrates(),
        }
    }
}

fn default_max_sample_rate() -> u32 {
    Policy::default().max_sample_rate
}

fn default_max_bit_depth() -> u8 {
    Policy::default().max_bit_depth
}

fn default_bitrate() -> u32 {
    Policy::default().default_bitrate_kbps
}

fn default_allowed_bitrates() -> Vec<u32> {
    Policy::default().allowed_bitrates
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
