//! Turns source facts and user decisions into a build plan.
//!
//! Everything here is pure: the same facts, decisions and [`Policy`] always
//! produce the same plan, including output paths and settings hashes.

mod action;
mod error;
mod naming;
mod plan;
mod policy;
mod types;

pub use action::{
    compute_default_action, compute_target_parameters, parse_action, Action, ActionProfile,
    CodecClass, DepthRule, DitherRule, RateRule, TargetParameters,
};
pub use error::{GroupValidationError, ValidationError};
pub use naming::{conversion_tag, output_path, sanitize_component};
pub use plan::{
    resolve_build_plan, resolve_item_group_action, resolve_jobs, settings_hash, validate_bitrate,
};
pub use policy::{Policy, TOOL_VERSION};
pub use types::{BuildPlan, Decision, Job, Provenance, ResolvedAction, TagPayload};
