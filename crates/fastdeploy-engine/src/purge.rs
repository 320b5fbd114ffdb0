//! Close-time garbage collection of the artifact history.
//!
//! A connected device catches up by installing, newest first, every
//! artifact still present in history. The purge removes what the device
//! can no longer need: hot-swap builds superseded by a later restart,
//! older copies of artifacts re-produced at the same location, resource
//! packages superseded by a full rebuild, and — once a full rebuild has
//! reproduced everything — the entire history, collapsed into the current
//! build.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use fastdeploy_model::{Artifact, Build, BuildMode, FileType, PatchingPolicy, VerifierStatus};

use crate::error::EngineError;
use crate::log::DeployLog;

/// File name of the legacy resources split. When the policy no longer
/// ships resources separately, a historical split by this name must not be
/// merged back during collapse.
pub(crate) const RESOURCES_SPLIT_FILE_NAME: &str = "resources.apk";

/// Device API level below which split installs require the main split to
/// be present even when unchanged.
const SPLIT_MAIN_REQUIRED_BELOW_API: u32 = 24;

/// Purge `builds` in place. `current_id` is the build being closed; the
/// oldest entry is the originating full build and is never deleted.
///
/// # Errors
/// Returns [`EngineError::Invariant`] if a full build collapses into zero
/// artifacts.
pub(crate) fn purge_history(
    builds: &mut BTreeMap<u64, Build>,
    current_id: u64,
    policy: PatchingPolicy,
    api_level: u32,
    log: &dyn DeployLog,
) -> Result<(), EngineError> {
    let Some(oldest_id) = builds.keys().next().copied() else {
        return Ok(());
    };

    walk_history(builds, oldest_id, log);
    drop_empty_builds(builds, current_id, oldest_id, log);
    reinject_split_main(builds, current_id, policy, api_level, log);

    let Some(current_mode) = builds.get(&current_id).map(|b| b.build_mode) else {
        return Ok(());
    };
    match current_mode {
        BuildMode::HotWarm => {}
        BuildMode::Cold => {
            // A cold build that reconstructed every artifact of the
            // originating build is reported as a full build, which is
            // simpler for clients to handle.
            if builds.len() == 2 && artifact_counts_match(builds, oldest_id, current_id) {
                if let Some(current) = builds.get_mut(&current_id) {
                    current.build_mode = BuildMode::Full;
                }
                log.debug(&format!(
                    "purge: cold build {current_id} reproduced all artifacts, promoting to FULL"
                ));
                collapse(builds, current_id, policy, log)?;
            }
        }
        fastdeploy_model::BuildMode::Full => {
            collapse(builds, current_id, policy, log)?;
        }
    }
    Ok(())
}

/// Newest-to-oldest walk over history: delete superseded hot-swap builds,
/// drop resource packages behind a restart, and keep each accumulative
/// artifact location only in the newest build that produced it.
///
/// The oldest (originating) build is exempt from deletion decisions but
/// participates in location dedup, so a re-produced artifact supersedes
/// the originating copy too.
fn walk_history(builds: &mut BTreeMap<u64, Build>, oldest_id: u64, log: &dyn DeployLog) {
    let ids_newest_first: Vec<u64> = builds.keys().rev().copied().collect();
    let mut found_cold_restart = false;
    let mut locations_seen: HashSet<PathBuf> = HashSet::new();

    for id in ids_newest_first {
        if id == oldest_id {
            if let Some(build) = builds.get_mut(&id) {
                dedup_artifacts(build, &mut locations_seen, log);
            }
            continue;
        }
        let status = builds.get(&id).and_then(|b| b.verifier_status);

        if status == Some(VerifierStatus::Compatible) && found_cold_restart {
            log.debug(&format!(
                "purge: deleting hot-swap build {id}, superseded by a later restart"
            ));
            builds.remove(&id);
            continue;
        }
        // Anything that is neither a no-op nor a hot swap restarted the
        // process; every older build is now behind a cold restart.
        let is_cold_restart = !matches!(
            status,
            None | Some(VerifierStatus::NoChanges) | Some(VerifierStatus::Compatible)
        );

        if let Some(build) = builds.get_mut(&id) {
            if found_cold_restart && build.has_artifact_of_type(FileType::Resources) {
                log.debug(&format!(
                    "purge: dropping resources of build {id}, re-delivered by a later restart"
                ));
                build.remove_artifacts_of_type(FileType::Resources);
            }
            dedup_artifacts(build, &mut locations_seen, log);
        }

        if is_cold_restart {
            found_cold_restart = true;
        }
    }
}

/// Remove accumulative artifacts whose location was already seen in a
/// newer build; record the remaining locations as seen.
fn dedup_artifacts(
    build: &mut Build,
    locations_seen: &mut HashSet<PathBuf>,
    log: &dyn DeployLog,
) {
    let build_id = build.build_id;
    build.artifacts.retain(|artifact| {
        if !artifact.file_type.is_accumulative() {
            return true;
        }
        if locations_seen.contains(&artifact.location) {
            log.debug(&format!(
                "purge: removing {} from build {build_id}, a newer build produced it",
                artifact.location.display()
            ));
            false
        } else {
            locations_seen.insert(artifact.location.clone());
            true
        }
    });
}

/// Delete builds the walk emptied out. The current build stays even when
/// empty (a no-change build is a valid record), and the originating build
/// is never purged.
fn drop_empty_builds(
    builds: &mut BTreeMap<u64, Build>,
    current_id: u64,
    oldest_id: u64,
    log: &dyn DeployLog,
) {
    let empty_ids: Vec<u64> = builds
        .iter()
        .filter(|(id, build)| {
            **id != current_id && **id != oldest_id && build.artifacts.is_empty()
        })
        .map(|(id, _)| *id)
        .collect();
    for id in empty_ids {
        log.debug(&format!("purge: deleting emptied build {id}"));
        builds.remove(&id);
    }
}

/// Pre-24 multi-APK installs reject a split install without the main
/// split. When the current build ships a split but no main split, copy the
/// most recent known main split into it. The trigger condition is a
/// device-install-time constraint; do not generalize it.
fn reinject_split_main(
    builds: &mut BTreeMap<u64, Build>,
    current_id: u64,
    policy: PatchingPolicy,
    api_level: u32,
    log: &dyn DeployLog,
) {
    if policy != PatchingPolicy::MultiApk || api_level >= SPLIT_MAIN_REQUIRED_BELOW_API {
        return;
    }
    let needs_main = builds.get(&current_id).is_some_and(|current| {
        current.has_artifact_of_type(FileType::Split)
            && !current.has_artifact_of_type(FileType::SplitMain)
    });
    if !needs_main {
        return;
    }
    let main_split: Option<Artifact> = builds
        .iter()
        .rev()
        .filter(|(id, _)| **id != current_id)
        .find_map(|(_, build)| build.artifact_of_type(FileType::SplitMain).cloned());
    if let Some(artifact) = main_split {
        log.debug(&format!(
            "purge: re-injecting main split {} for pre-24 split install",
            artifact.location.display()
        ));
        if let Some(current) = builds.get_mut(&current_id) {
            current.artifacts.push(artifact);
        }
    }
}

fn artifact_counts_match(builds: &BTreeMap<u64, Build>, oldest_id: u64, current_id: u64) -> bool {
    let oldest_count = builds.get(&oldest_id).map(|b| b.artifacts.len());
    let current_count = builds.get(&current_id).map(|b| b.artifacts.len());
    oldest_count.is_some() && oldest_count == current_count
}

/// Merge every historical split location (newest copy) plus the most
/// recent main split into the current build, then drop all other builds:
/// the current build becomes the new originating full build.
fn collapse(
    builds: &mut BTreeMap<u64, Build>,
    current_id: u64,
    policy: PatchingPolicy,
    log: &dyn DeployLog,
) -> Result<(), EngineError> {
    let mut locations_present: HashSet<PathBuf> = builds
        .get(&current_id)
        .map(|current| {
            current
                .artifacts
                .iter()
                .map(|a| a.location.clone())
                .collect()
        })
        .unwrap_or_default();

    let mut merged: Vec<Artifact> = Vec::new();
    for (id, build) in builds.iter().rev() {
        if *id == current_id {
            continue;
        }
        for artifact in build.artifacts.iter().filter(|a| a.file_type == FileType::Split) {
            if locations_present.contains(&artifact.location) {
                continue;
            }
            if !policy.uses_separate_resources() && is_legacy_resources_split(artifact) {
                log.debug(&format!(
                    "purge: dropping legacy resources split {} from collapse",
                    artifact.location.display()
                ));
                continue;
            }
            locations_present.insert(artifact.location.clone());
            merged.push(artifact.clone());
        }
    }

    let current_has_main = builds
        .get(&current_id)
        .is_some_and(|b| b.has_artifact_of_type(FileType::SplitMain));
    if !current_has_main {
        let main_split = builds
            .iter()
            .rev()
            .filter(|(id, _)| **id != current_id)
            .find_map(|(_, build)| build.artifact_of_type(FileType::SplitMain).cloned());
        if let Some(artifact) = main_split {
            merged.push(artifact);
        }
    }

    let Some(current) = builds.get_mut(&current_id) else {
        return Ok(());
    };
    if !merged.is_empty() {
        log.debug(&format!(
            "purge: collapsing {} historical artifact(s) into build {current_id}",
            merged.len()
        ));
    }
    current.artifacts.extend(merged);

    // A full build that ends up with nothing to install is a logic defect,
    // not a user error; persisting it would strand the device.
    if current.artifacts.is_empty() {
        return Err(EngineError::Invariant {
            message: format!("full build {current_id} collapsed into zero artifacts"),
        });
    }

    builds.retain(|id, _| *id == current_id);
    Ok(())
}

fn is_legacy_resources_split(artifact: &Artifact) -> bool {
    artifact
        .location
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == RESOURCES_SPLIT_FILE_NAME)
}
