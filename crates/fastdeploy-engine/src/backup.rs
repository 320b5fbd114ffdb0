//! Best-effort backup of a build's artifacts.
//!
//! The next build iteration diffs against these copies. Backup is never
//! allowed to fail a build: every I/O problem is logged and skipped.

use std::path::Path;

use fastdeploy_model::Build;
use fastdeploy_util::fs;

use crate::log::DeployLog;

/// Copy each of `build`'s artifacts into `backup_dir/<build_id>/`,
/// keeping file names. Returns how many were copied; failures are
/// logged through `log` and skipped.
pub fn backup_artifacts(build: &Build, backup_dir: &Path, log: &dyn DeployLog) -> usize {
    let dest_dir = backup_dir.join(build.build_id.to_string());
    if let Err(e) = fs::ensure_dir(&dest_dir) {
        log.debug(&format!("artifact backup skipped: {e}"));
        return 0;
    }
    let mut copied = 0;
    for artifact in &build.artifacts {
        let Some(file_name) = artifact.location.file_name() else {
            log.debug(&format!(
                "artifact backup skipped for {}: no file name",
                artifact.location.display()
            ));
            continue;
        };
        match fs::copy_file(&artifact.location, &dest_dir.join(file_name)) {
            Ok(()) => copied += 1,
            Err(e) => log.debug(&format!("artifact backup failed: {e}")),
        }
    }
    copied
}
