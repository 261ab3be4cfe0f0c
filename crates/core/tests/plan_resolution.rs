//! Build plan resolution integration tests.
//!
//! These tests drive the resolver through its public entry point:
//! - Default actions and target parameters for each source kind
//! - User overrides, including unrecognized action strings
//! - Group-level isolation of validation errors
//! - Determinism across input order

use std::collections::HashMap;
use std::path::PathBuf;

use podbuild_core::{
    library::ItemGroup,
    resolve_build_plan,
    resolver::{CodecClass, Provenance, resolve_item_group_action},
    testing::fixtures,
    Action, BuildPlan, Decision, Policy,
};

fn policy() -> Policy {
    Policy::default().with_output_root("/out")
}

fn single(group: ItemGroup) -> BuildPlan {
    resolve_build_plan(&[group], &HashMap::new(), &policy())
}

fn flac_album(id: &str, sample_rate: u32, bit_depth: u8) -> ItemGroup {
    fixtures::group(
        id,
        (1..=3)
            .map(|n| {
                fixtures::item(
                    &format!("/music/{}/{:02}.flac", id, n),
                    sample_rate,
                    Some(bit_depth),
                )
            })
            .collect(),
    )
}

fn lossy_album(id: &str, extension: &str) -> ItemGroup {
    fixtures::group(
        id,
        vec![
            fixtures::item(&format!("/music/{}/01.{}", id, extension), 44100, None),
            fixtures::item(&format!("/music/{}/02.{}", id, extension), 44100, None),
        ],
    )
}

#[test]
fn test_cd_quality_lossless_is_preserved() {
    let plan = single(flac_album("cd", 44100, 16));

    assert_eq!(plan.len(), 3);
    for job in &plan.jobs {
        assert_eq!(job.action, Action::Preserve);
        assert_eq!(job.target.sample_rate, 44100);
        assert_eq!(job.target.bit_depth, Some(16));
        assert!(!job.target.dither);
        assert!(!job.target.resample);
        assert!(job.output_path.to_string_lossy().ends_with("[ALAC].m4a"));
    }
}

#[test]
fn test_hires_lossless_is_downconverted_to_ceiling() {
    let plan = single(flac_album("hires", 96000, 24));

    for job in &plan.jobs {
        assert_eq!(job.action, Action::Downconvert);
        assert_eq!(job.target.sample_rate, 44100);
        assert_eq!(job.target.bit_depth, Some(16));
        assert!(job.target.dither);
        assert!(job.target.resample);
        assert!(
            job.output_path.to_string_lossy().ends_with("[ALAC-16-44.1].m4a"),
            "{}",
            job.output_path.display()
        );
    }
}

#[test]
fn test_caller_supplied_ceiling() {
    let policy = policy().with_ceiling(48000, 24);
    let plan = resolve_build_plan(&[flac_album("hires", 96000, 24)], &HashMap::new(), &policy);

    for job in &plan.jobs {
        assert_eq!(job.action, Action::Downconvert);
        assert_eq!(job.target.sample_rate, 48000);
        assert_eq!(job.target.bit_depth, Some(24));
        assert!(!job.target.dither);
        assert!(job.target.resample);
    }
}

#[test]
fn test_mp3_album_is_passed_through() {
    let plan = single(lossy_album("mp3s", "mp3"));

    for job in &plan.jobs {
        assert_eq!(job.action, Action::Passthrough);
        assert_eq!(job.codec, CodecClass::Copy);
        assert_eq!(job.codec.as_str(), "copy");
        assert!(!job.target.resample);
        assert!(!job.target.dither);
        assert_eq!(job.target.sample_rate, 44100);
        assert!(job.output_path.to_string_lossy().ends_with("[MP3].mp3"));
    }
}

#[test]
fn test_other_lossy_album_encodes_at_default_bitrate() {
    let plan = single(lossy_album("oggs", "ogg"));

    assert_eq!(plan.len(), 2);
    for job in &plan.jobs {
        assert_eq!(job.action, Action::LossyEncode);
        assert_eq!(job.codec, CodecClass::Aac);
        assert_eq!(job.bitrate_kbps, Some(256));
        assert_eq!(job.target.bit_depth, None);
        assert!(job.output_path.to_string_lossy().ends_with("[AAC-256k].m4a"));
    }
}

#[test]
fn test_unrecognized_action_falls_back_silently() {
    let group = flac_album("cd", 44100, 16);
    let decisions = HashMap::from([("cd".to_string(), Decision::with_action("transmogrify"))]);

    let plan = resolve_build_plan(&[group.clone()], &decisions, &policy());
    assert!(plan.validation_errors.is_empty());
    assert_eq!(plan.len(), 3);
    assert!(plan.jobs.iter().all(|j| j.action == Action::Preserve));

    let resolved =
        resolve_item_group_action(&group, decisions.get("cd"), &policy()).unwrap();
    assert_eq!(resolved.provenance, Provenance::Default);
}

#[test]
fn test_synonyms_are_case_and_punctuation_insensitive() {
    let group = flac_album("cd", 44100, 16);
    let decisions = HashMap::from([(
        "cd".to_string(),
        Decision {
            user_action: Some("  Lossy-Encode ".to_string()),
            bitrate_kbps: Some(192),
            skip: false,
        },
    )]);

    let plan = resolve_build_plan(&[group], &decisions, &policy());
    assert!(plan.jobs.iter().all(|j| j.action == Action::LossyEncode));
    assert!(plan.jobs.iter().all(|j| j.bitrate_kbps == Some(192)));
}

#[test]
fn test_skip_flag_excludes_group() {
    let decisions = HashMap::from([("cd".to_string(), Decision::skipped())]);
    let plan = resolve_build_plan(
        &[flac_album("cd", 44100, 16), lossy_album("mp3s", "mp3")],
        &decisions,
        &policy(),
    );

    assert_eq!(plan.skipped_groups, vec!["cd".to_string()]);
    assert!(plan.jobs.iter().all(|j| j.group_id == "mp3s"));
}

#[test]
fn test_invalid_bitrate_isolated_to_its_group() {
    let good = flac_album("good", 44100, 16);
    let bad = lossy_album("bad", "ogg");
    let baseline = single(good.clone());

    let decisions = HashMap::from([(
        "bad".to_string(),
        Decision {
            user_action: None,
            bitrate_kbps: Some(999),
            skip: false,
        },
    )]);
    let plan = resolve_build_plan(&[bad, good], &decisions, &policy());

    assert_eq!(plan.validation_errors.len(), 1);
    assert_eq!(plan.validation_errors[0].group_id, "bad");
    assert_eq!(plan.validation_errors[0].error_code, "INVALID_BITRATE");
    assert_eq!(plan.jobs, baseline.jobs);
}

#[test]
fn test_colliding_groups_rejected() {
    let mut first = flac_album("first", 44100, 16);
    let mut second = flac_album("second", 44100, 16);
    first.metadata.album = Some("Same Album".to_string());
    second.metadata.album = Some("SAME ALBUM".to_string());
    let other = lossy_album("other", "mp3");

    let plan = resolve_build_plan(&[first, second, other], &HashMap::new(), &policy());

    let rejected: Vec<&str> = plan
        .validation_errors
        .iter()
        .map(|e| e.group_id.as_str())
        .collect();
    assert_eq!(rejected, vec!["first", "second"]);
    assert!(plan
        .validation_errors
        .iter()
        .all(|e| e.error_code == "OUTPUT_COLLISION"));
    assert!(plan.jobs.iter().all(|j| j.group_id == "other"));
}

#[test]
fn test_plan_is_independent_of_scanner_order() {
    let groups = vec![
        flac_album("b", 96000, 24),
        lossy_album("a", "mp3"),
        lossy_album("c", "ogg"),
    ];
    let mut reversed = groups.clone();
    reversed.reverse();
    for group in &mut reversed {
        group.items.reverse();
    }

    let forward = resolve_build_plan(&groups, &HashMap::new(), &policy());
    let backward = resolve_build_plan(&reversed, &HashMap::new(), &policy());
    assert_eq!(forward, backward);
    assert_eq!(forward.jobs.first().map(|j| j.group_id.as_str()), Some("a"));
}

#[test]
fn test_decision_sheet_contract() {
    let json = r#"{
        "cd": {"user_action": "", "bitrate": null, "skip": false},
        "oggs": {"user_action": "AAC", "bitrate": 320}
    }"#;
    let decisions: HashMap<String, Decision> = serde_json::from_str(json).unwrap();

    let plan = resolve_build_plan(
        &[flac_album("cd", 44100, 16), lossy_album("oggs", "ogg")],
        &decisions,
        &policy(),
    );

    let cd: Vec<_> = plan.jobs.iter().filter(|j| j.group_id == "cd").collect();
    assert!(cd.iter().all(|j| j.action == Action::Preserve));
    let oggs: Vec<_> = plan.jobs.iter().filter(|j| j.group_id == "oggs").collect();
    assert!(oggs.iter().all(|j| j.bitrate_kbps == Some(320)));
    assert_eq!(
        oggs[0].output_path,
        PathBuf::from("/out/Test Artist/2024 - oggs/00 01 [AAC-320k].m4a")
    );
}
