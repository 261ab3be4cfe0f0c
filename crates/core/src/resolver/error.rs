//! Error types for plan resolution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a group cannot be turned into jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Action string does not match any known action or synonym.
    #[error("Invalid action '{value}'. Valid actions: preserve, downconvert, lossy_encode, passthrough, skip")]
    InvalidAction { value: String },

    /// Bitrate is not in the policy allow-list.
    #[error("Invalid bitrate {bitrate}kbps. Allowed: {allowed:?}")]
    InvalidBitrate { bitrate: u32, allowed: Vec<u32> },

    /// Two jobs would write the same output file.
    #[error("Output path {path} collides with group '{other_group}'")]
    OutputCollision { path: PathBuf, other_group: String },
}

impl ValidationError {
    /// Stable code reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAction { .. } => "INVALID_ENUM",
            Self::InvalidBitrate { .. } => "INVALID_BITRATE",
            Self::OutputCollision { .. } => "OUTPUT_COLLISION",
        }
    }
}

/// A validation error attached to the group it excluded from the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupValidationError {
    pub group_id: String,
    pub error_code: String,
    pub message: String,
}

impl GroupValidationError {
    pub fn new(group_id: impl Into<String>, error: &ValidationError) -> Self {
        Self {
            group_id: group_id.into(),
            error_code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
