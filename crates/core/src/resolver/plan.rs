//! Group resolution and build plan assembly.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::action::{
    compute_default_action, compute_target_parameters, parse_action, Action, CodecClass,
};
use super::error::{GroupValidationError, ValidationError};
use super::naming::output_path;
use super::policy::Policy;
use super::types::{BuildPlan, Decision, Job, Provenance, ResolvedAction, TagPayload};
use crate::library::{Fingerprint, ItemFacts, ItemGroup};

/// Checks a bitrate against the allow-list, substituting the default when absent.
pub fn validate_bitrate(bitrate_kbps: Option<u32>, policy: &Policy) -> Result<u32, ValidationError> {
    let bitrate = bitrate_kbps.unwrap_or(policy.default_bitrate_kbps);
    if policy.allowed_bitrates.contains(&bitrate) {
        Ok(bitrate)
    } else {
        Err(ValidationError::InvalidBitrate {
            bitrate,
            allowed: policy.allowed_bitrates.clone(),
        })
    }
}

/// Digest of every input that determines an output's bytes.
///
/// Truncated to 16 hex characters. The source mtime is left out: the cache
/// compares it against the stored fingerprint with a tolerance, and any
/// rounding here would defeat that tolerance at millisecond boundaries.
pub fn settings_hash(
    fingerprint: &Fingerprint,
    action: Action,
    bitrate_kbps: Option<u32>,
    target_sample_rate: u32,
    target_bit_depth: Option<u8>,
    tool_version: &str,
) -> String {
    let material = format!(
        "{}:{}:{}:{}:{}:{}:{}",
        fingerprint.path.display(),
        fingerprint.size_bytes,
        action.as_str(),
        bitrate_kbps.unwrap_or(0),
        target_sample_rate,
        target_bit_depth.unwrap_or(0),
        tool_version
    );
    let digest = format!("{:x}", Sha256::digest(material.as_bytes()));
    digest[..16].to_string()
}

/// Resolves the final action for one group.
///
/// A skip flag wins over everything. An unrecognized action string falls
/// back to the default action without failing the group. An out-of-list
/// bitrate does fail the group.
pub fn resolve_item_group_action(
    group: &ItemGroup,
    decision: Option<&Decision>,
    policy: &Policy,
) -> Result<ResolvedAction, ValidationError> {
    let default_action = compute_default_action(group, policy);

    if decision.is_some_and(|d| d.skip) {
        return Ok(ResolvedAction {
            group_id: group.group_id.clone(),
            action: Action::Skip,
            bitrate_kbps: None,
            skip: true,
            provenance: Provenance::UserOverride,
        });
    }

    let (action, provenance) = match decision.and_then(Decision::action_override) {
        Some(raw) => match parse_action(raw) {
            Ok(action) => (action, Provenance::UserOverride),
            Err(e) => {
                debug!(
                    group_id = %group.group_id,
                    error = %e,
                    fallback = %default_action,
                    "Ignoring unrecognized action"
                );
                (default_action, Provenance::Default)
            }
        },
        None => (default_action, Provenance::Default),
    };

    let needs_bitrate = action.profile().is_some_and(|p| p.needs_bitrate);
    let bitrate_kbps = if needs_bitrate {
        Some(validate_bitrate(
            decision.and_then(|d| d.bitrate_kbps),
            policy,
        )?)
    } else {
        None
    };

    Ok(ResolvedAction {
        group_id: group.group_id.clone(),
        action,
        bitrate_kbps,
        skip: action == Action::Skip,
        provenance,
    })
}

fn tag_payload(group: &ItemGroup, item: &ItemFacts) -> TagPayload {
    let meta = &group.metadata;
    let tags = &item.tags;
    TagPayload {
        title: tags.title.clone().or_else(|| {
            item.path()
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        }),
        artist: tags.artist.clone().or_else(|| meta.artist.clone()),
        album: tags.album.clone().or_else(|| meta.album.clone()),
        album_artist: tags
            .album_artist
            .clone()
            .or_else(|| meta.album_artist.clone()),
        track_number: tags.track_number,
        track_total: tags.track_total,
        disc_number: tags.disc_number,
        disc_total: tags.disc_total,
        year: tags.year.or(meta.year),
        compilation: tags.compilation.unwrap_or(false) || meta.is_compilation,
    }
}

/// Expands a resolved group into one job per item.
///
/// Jobs come out sorted by source path so scanner order does not leak into
/// the plan.
pub fn resolve_jobs(group: &ItemGroup, resolved: &ResolvedAction, policy: &Policy) -> Vec<Job> {
    let Some(profile) = resolved.action.profile() else {
        return Vec::new();
    };
    if resolved.skip {
        return Vec::new();
    }

    let artwork = group.metadata.artwork_candidates.first().cloned();
    let mut items: Vec<&ItemFacts> = group.items.iter().collect();
    items.sort_by(|a, b| a.path().cmp(b.path()));

    items
        .into_iter()
        .filter_map(|item| {
            let tech = &item.technical;
            let target =
                compute_target_parameters(tech.sample_rate, tech.bit_depth, resolved.action, policy)?;
            let output = output_path(
                &policy.output_root,
                group,
                item,
                resolved.action,
                profile.extension,
                resolved.bitrate_kbps,
                &target,
            );
            let hash = settings_hash(
                &item.fingerprint,
                resolved.action,
                resolved.bitrate_kbps,
                target.sample_rate,
                target.bit_depth,
                &policy.tool_version,
            );

            Some(Job {
                job_id: item.item_id.clone(),
                group_id: group.group_id.clone(),
                source_path: item.path().to_path_buf(),
                output_path: output,
                action: resolved.action,
                codec: profile.codec,
                source_sample_rate: tech.sample_rate,
                source_bit_depth: tech.bit_depth,
                source_channels: tech.channels,
                source_duration_secs: tech.duration_secs,
                target,
                bitrate_kbps: resolved.bitrate_kbps,
                downmix: tech.channels > 2 && profile.codec != CodecClass::Copy,
                tags: tag_payload(group, item),
                artwork: artwork.clone(),
                fingerprint: item.fingerprint.clone(),
                settings_hash: hash,
            })
        })
        .collect()
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Resolves every group into a single ordered plan.
///
/// Groups are processed in ascending id order. A group that fails
/// validation is recorded and excluded; the rest are unaffected. Groups
/// whose outputs collide (case-insensitively) with another job are all
/// excluded with an `OUTPUT_COLLISION` error.
pub fn resolve_build_plan(
    groups: &[ItemGroup],
    decisions: &HashMap<String, Decision>,
    policy: &Policy,
) -> BuildPlan {
    let mut ordered: Vec<&ItemGroup> = groups.iter().collect();
    ordered.sort_by(|a, b| a.group_id.cmp(&b.group_id));

    let mut plan = BuildPlan::default();
    let mut resolved_jobs: Vec<(String, Vec<Job>)> = Vec::new();

    for group in ordered {
        let decision = decisions.get(&group.group_id);
        match resolve_item_group_action(group, decision, policy) {
            Ok(resolved) if resolved.skip => {
                plan.skipped_groups.push(group.group_id.clone());
            }
            Ok(resolved) => {
                let jobs = resolve_jobs(group, &resolved, policy);
                resolved_jobs.push((group.group_id.clone(), jobs));
            }
            Err(e) => {
                debug!(group_id = %group.group_id, error = %e, "Group failed validation");
                plan.validation_errors
                    .push(GroupValidationError::new(&group.group_id, &e));
            }
        }
    }

    let mut owners: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (group_id, jobs) in &resolved_jobs {
        for job in jobs {
            owners
                .entry(collision_key(&job.output_path))
                .or_default()
                .push(group_id);
        }
    }

    // First collision found per group, keyed by group id.
    let mut collisions: BTreeMap<String, ValidationError> = BTreeMap::new();
    for (group_id, jobs) in &resolved_jobs {
        for job in jobs {
            let key = collision_key(&job.output_path);
            let Some(claimants) = owners.get(&key) else {
                continue;
            };
            if claimants.len() < 2 || collisions.contains_key(group_id) {
                continue;
            }
            let other = claimants
                .iter()
                .find(|g| **g != group_id.as_str())
                .copied()
                .unwrap_or(group_id.as_str());
            collisions.insert(
                group_id.clone(),
                ValidationError::OutputCollision {
                    path: job.output_path.clone(),
                    other_group: other.to_string(),
                },
            );
        }
    }

    let mut excluded: BTreeSet<String> = BTreeSet::new();
    for (group_id, error) in &collisions {
        plan.validation_errors
            .push(GroupValidationError::new(group_id, error));
        excluded.insert(group_id.clone());
    }
    plan.validation_errors
        .sort_by(|a, b| a.group_id.cmp(&b.group_id));

    for (group_id, jobs) in resolved_jobs {
        if !excluded.contains(&group_id) {
            plan.jobs.extend(jobs);
        }
    }

    info!(
        jobs = plan.jobs.len(),
        skipped = plan.skipped_groups.len(),
        errors = plan.validation_errors.len(),
        "Resolved build plan"
    );
    plan
}
