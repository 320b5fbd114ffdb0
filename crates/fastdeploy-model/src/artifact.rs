//! Artifact and build records accumulated across incremental builds.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::status::{BuildMode, VerifierStatus};

/// The kind of file a build produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// The full main APK. Never stored: registration rewrites it to
    /// [`FileType::SplitMain`] so multi-APK policies stay unambiguous.
    Main,
    /// The main split of a multi-APK install.
    SplitMain,
    /// A secondary APK split.
    Split,
    /// A hot-swap patch dex.
    ReloadDex,
    /// The separately-shipped resources package.
    Resources,
}

impl FileType {
    /// Whether artifacts of this type represent durable state that a later
    /// build can supersede. Hot-swap patches are consumed once and are not
    /// accumulative.
    pub fn is_accumulative(self) -> bool {
        self != FileType::ReloadDex
    }

    /// Stable name used in the persisted build-info file.
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Main => "MAIN",
            FileType::SplitMain => "SPLIT_MAIN",
            FileType::Split => "SPLIT",
            FileType::ReloadDex => "RELOAD_DEX",
            FileType::Resources => "RESOURCES",
        }
    }

    /// Parse a persisted type name.
    pub fn from_name(name: &str) -> Option<FileType> {
        match name {
            "MAIN" => Some(FileType::Main),
            "SPLIT_MAIN" => Some(FileType::SplitMain),
            "SPLIT" => Some(FileType::Split),
            "RELOAD_DEX" => Some(FileType::ReloadDex),
            "RESOURCES" => Some(FileType::Resources),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file produced by a build. Identity is `(file_type, location)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_type: FileType,
    pub location: PathBuf,
}

impl Artifact {
    pub fn new(file_type: FileType, location: impl Into<PathBuf>) -> Self {
        Self {
            file_type,
            location: location.into(),
        }
    }

    /// Whether `other` names the same artifact.
    pub fn same_identity(&self, other: &Artifact) -> bool {
        self.file_type == other.file_type && self.location == other.location
    }
}

/// The record of a single build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Monotonic build id; wall-clock millis by default.
    pub build_id: u64,
    /// The winning verifier outcome, once one has been reported.
    pub verifier_status: Option<VerifierStatus>,
    /// Every outcome observed during the build, in report order, without
    /// duplicates. Not persisted.
    pub all_statuses: Vec<VerifierStatus>,
    /// Severity derived from the observed outcomes. Monotonic.
    pub build_mode: BuildMode,
    /// Eligibility outcome reported by the IDE handshake, if any.
    pub eligibility: Option<VerifierStatus>,
    /// Files produced by this build, in registration order.
    pub artifacts: Vec<Artifact>,
}

impl Build {
    pub fn new(build_id: u64) -> Self {
        Self {
            build_id,
            verifier_status: None,
            all_statuses: Vec::new(),
            build_mode: BuildMode::HotWarm,
            eligibility: None,
            artifacts: Vec::new(),
        }
    }

    /// Record an observed status in the append-only set.
    pub fn record_status(&mut self, status: VerifierStatus) {
        if !self.all_statuses.contains(&status) {
            self.all_statuses.push(status);
        }
    }

    /// Whether `status` was observed at any point during this build.
    pub fn was_status_observed(&self, status: VerifierStatus) -> bool {
        self.all_statuses.contains(&status)
    }

    /// Whether an artifact with the same identity is already recorded.
    pub fn has_artifact(&self, candidate: &Artifact) -> bool {
        self.artifacts.iter().any(|a| a.same_identity(candidate))
    }

    /// The first artifact of the given type, if any.
    pub fn artifact_of_type(&self, file_type: FileType) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.file_type == file_type)
    }

    /// Whether any artifact of the given type is recorded.
    pub fn has_artifact_of_type(&self, file_type: FileType) -> bool {
        self.artifact_of_type(file_type).is_some()
    }

    /// Drop every artifact of the given type.
    pub fn remove_artifacts_of_type(&mut self, file_type: FileType) {
        self.artifacts.retain(|a| a.file_type != file_type);
    }

    /// Drop the artifact at `location`, if recorded.
    pub fn remove_artifact_at(&mut self, location: &Path) {
        self.artifacts.retain(|a| a.location != location);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reload_dex_is_not_accumulative() {
        assert!(!FileType::ReloadDex.is_accumulative());
        for t in [
            FileType::Main,
            FileType::SplitMain,
            FileType::Split,
            FileType::Resources,
        ] {
            assert!(t.is_accumulative(), "{t} should be accumulative");
        }
    }

    #[test]
    fn file_type_name_round_trip() {
        for t in [
            FileType::Main,
            FileType::SplitMain,
            FileType::Split,
            FileType::ReloadDex,
            FileType::Resources,
        ] {
            assert_eq!(FileType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(FileType::from_name("DEX"), None);
    }

    #[test]
    fn artifact_identity_needs_both_fields() {
        let a = Artifact::new(FileType::Split, "/out/a.apk");
        assert!(a.same_identity(&Artifact::new(FileType::Split, "/out/a.apk")));
        assert!(!a.same_identity(&Artifact::new(FileType::Split, "/out/b.apk")));
        assert!(!a.same_identity(&Artifact::new(FileType::Resources, "/out/a.apk")));
    }

    #[test]
    fn record_status_is_append_only_set() {
        let mut build = Build::new(1);
        build.record_status(VerifierStatus::Compatible);
        build.record_status(VerifierStatus::MethodAdded);
        build.record_status(VerifierStatus::Compatible);

        assert_eq!(
            build.all_statuses,
            vec![VerifierStatus::Compatible, VerifierStatus::MethodAdded]
        );
        assert!(build.was_status_observed(VerifierStatus::MethodAdded));
        assert!(!build.was_status_observed(VerifierStatus::FieldAdded));
    }

    #[test]
    fn artifact_lookup_helpers() {
        let mut build = Build::new(1);
        build
            .artifacts
            .push(Artifact::new(FileType::SplitMain, "/out/main.apk"));
        build
            .artifacts
            .push(Artifact::new(FileType::Resources, "/out/res.apk"));

        assert!(build.has_artifact_of_type(FileType::SplitMain));
        assert!(!build.has_artifact_of_type(FileType::ReloadDex));
        assert_eq!(
            build.artifact_of_type(FileType::Resources).unwrap().location,
            PathBuf::from("/out/res.apk")
        );

        build.remove_artifacts_of_type(FileType::Resources);
        assert!(!build.has_artifact_of_type(FileType::Resources));
        assert_eq!(build.artifacts.len(), 1);

        build.remove_artifact_at(Path::new("/out/main.apk"));
        assert!(build.artifacts.is_empty());
    }
}
