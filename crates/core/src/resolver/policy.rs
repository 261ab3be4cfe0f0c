//! Policy constants applied to every resolution.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version string mixed into every settings hash.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Immutable resolution policy.
///
/// Passed explicitly into every resolver call so runs and tests can vary the
/// ceiling without touching global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Highest sample rate any job will target.
    pub max_sample_rate: u32,
    /// Highest bit depth any lossless job will target.
    pub max_bit_depth: u8,
    /// Bitrate used for lossy encodes when the decision gives none.
    pub default_bitrate_kbps: u32,
    /// Bitrates a decision may request.
    pub allowed_bitrates: Vec<u32>,
    /// Version mixed into settings hashes.
    pub tool_version: String,
    /// Root of the output library.
    pub output_root: PathBuf,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_sample_rate: 44_100,
            max_bit_depth: 16,
            default_bitrate_kbps: 256,
            allowed_bitrates: vec![128, 192, 256, 320],
            tool_version: TOOL_VERSION.to_string(),
            output_root: PathBuf::from("output"),
        }
    }
}

impl Policy {
    pub fn with_output_root(mut self, root: impl AsRef<Path>) -> Self {
        self.output_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_ceiling(mut self, sample_rate: u32, bit_depth: u8) -> Self {
        self.max_sample_rate = sample_rate;
        self.max_bit_depth = bit_depth;
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    pub fn with_default_bitrate(mut self, kbps: u32) -> Self {
        self.default_bitrate_kbps = kbps;
        self
    }

    /// Whether a source exceeds the ceiling in either dimension.
    pub fn exceeds_ceiling(&self, sample_rate: u32, bit_depth: Option<u8>) -> bool {
        sample_rate > self.max_sample_rate
            || bit_depth.is_some_and(|bd| bd > self.max_bit_depth)
    }
}
