//! Verifier outcomes, the build-mode severity lattice, and patching policies.

use std::fmt;

/// How severe a rebuild the device needs to pick up the current changes.
///
/// The lattice is ordered `HotWarm < Cold < Full`; combining two modes
/// yields the more severe one, so the mode recorded for a build can only
/// ever escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildMode {
    /// Changes can be hot-swapped (or warm-swapped) into the running process.
    HotWarm,
    /// The app process must be restarted; only changed splits are shipped.
    Cold,
    /// Everything must be reinstalled from scratch.
    Full,
}

impl BuildMode {
    /// Combine two modes, keeping the more severe.
    #[must_use]
    pub fn combine(self, other: BuildMode) -> BuildMode {
        self.max(other)
    }

    /// Stable name used in the persisted build-info file.
    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::HotWarm => "HOT_WARM",
            BuildMode::Cold => "COLD",
            BuildMode::Full => "FULL",
        }
    }

    /// Parse a persisted mode name.
    pub fn from_name(name: &str) -> Option<BuildMode> {
        match name {
            "HOT_WARM" => Some(BuildMode::HotWarm),
            "COLD" => Some(BuildMode::Cold),
            "FULL" => Some(BuildMode::Full),
            _ => None,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The artifact-splitting strategy in effect for a build.
///
/// Resolved once per process from the connected device and the build
/// configuration; it never changes during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchingPolicy {
    /// Each slice of the app ships as its own APK split.
    MultiApk,
    /// Like [`PatchingPolicy::MultiApk`], but resources ship in a
    /// dedicated resources split instead of the main split.
    MultiApkSeparateResources,
    /// No usable policy (incremental deploy disabled, or the device cannot
    /// install split APKs). Every change requires a full rebuild.
    Unknown,
}

impl PatchingPolicy {
    /// Lowest device API level that supports split-APK installs.
    pub const MIN_SPLIT_API_LEVEL: u32 = 21;

    /// Resolve the policy for a device and build configuration.
    ///
    /// Pure function: disabled incremental deploy or a device below the
    /// split-install floor always yields [`PatchingPolicy::Unknown`].
    pub fn resolve(
        api_level: u32,
        create_separate_apk_for_resources: bool,
        instant_run_enabled: bool,
    ) -> PatchingPolicy {
        if !instant_run_enabled || api_level < Self::MIN_SPLIT_API_LEVEL {
            return PatchingPolicy::Unknown;
        }
        if create_separate_apk_for_resources {
            PatchingPolicy::MultiApkSeparateResources
        } else {
            PatchingPolicy::MultiApk
        }
    }

    /// Whether resources ship as their own split under this policy.
    pub fn uses_separate_resources(self) -> bool {
        matches!(self, PatchingPolicy::MultiApkSeparateResources)
    }

    /// Stable name used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            PatchingPolicy::MultiApk => "MULTI_APK",
            PatchingPolicy::MultiApkSeparateResources => "MULTI_APK_SEPARATE_RESOURCES",
            PatchingPolicy::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PatchingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the static compatibility verifier for one change set.
///
/// `NoChanges` and `Compatible` are the only hot-swappable outcomes; the
/// remaining variants name the incompatible change that forced a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifierStatus {
    NoChanges,
    Compatible,
    InitialBuild,
    MethodAdded,
    MethodRemoved,
    MethodSignatureChanged,
    MethodAnnotationChanged,
    FieldAdded,
    FieldRemoved,
    FieldTypeChanged,
    StaticInitializerChanged,
    ConstructorSignatureChanged,
    ClassAdded,
    ClassRemoved,
    ClassAnnotationChanged,
    ParentClassChanged,
    ImplementedInterfacesChanged,
    ReflectionUsed,
    ResourcesChanged,
    JavaResourcesChanged,
    ManifestChanged,
    BinaryManifestChanged,
    DependencyChanged,
    ApiLevelChanged,
    FullBuildRequested,
    ColdSwapRequested,
}

impl VerifierStatus {
    /// The minimal rebuild severity this outcome forces under `policy`.
    ///
    /// Without a usable patching policy every outcome requires a full
    /// rebuild, since nothing can be delivered incrementally.
    pub fn required_mode(self, policy: PatchingPolicy) -> BuildMode {
        if policy == PatchingPolicy::Unknown {
            return BuildMode::Full;
        }
        match self {
            VerifierStatus::NoChanges | VerifierStatus::Compatible => BuildMode::HotWarm,
            VerifierStatus::InitialBuild
            | VerifierStatus::ManifestChanged
            | VerifierStatus::BinaryManifestChanged
            | VerifierStatus::DependencyChanged
            | VerifierStatus::ApiLevelChanged
            | VerifierStatus::FullBuildRequested => BuildMode::Full,
            _ => BuildMode::Cold,
        }
    }

    /// Whether this outcome still permits a hot swap.
    pub fn is_hot_swappable(self) -> bool {
        matches!(self, VerifierStatus::NoChanges | VerifierStatus::Compatible)
    }

    /// Stable name used in the persisted build-info file.
    pub fn as_str(self) -> &'static str {
        match self {
            VerifierStatus::NoChanges => "NO_CHANGES",
            VerifierStatus::Compatible => "COMPATIBLE",
            VerifierStatus::InitialBuild => "INITIAL_BUILD",
            VerifierStatus::MethodAdded => "METHOD_ADDED",
            VerifierStatus::MethodRemoved => "METHOD_REMOVED",
            VerifierStatus::MethodSignatureChanged => "METHOD_SIGNATURE_CHANGED",
            VerifierStatus::MethodAnnotationChanged => "METHOD_ANNOTATION_CHANGED",
            VerifierStatus::FieldAdded => "FIELD_ADDED",
            VerifierStatus::FieldRemoved => "FIELD_REMOVED",
            VerifierStatus::FieldTypeChanged => "FIELD_TYPE_CHANGED",
            VerifierStatus::StaticInitializerChanged => "STATIC_INITIALIZER_CHANGED",
            VerifierStatus::ConstructorSignatureChanged => "CONSTRUCTOR_SIGNATURE_CHANGED",
            VerifierStatus::ClassAdded => "CLASS_ADDED",
            VerifierStatus::ClassRemoved => "CLASS_REMOVED",
            VerifierStatus::ClassAnnotationChanged => "CLASS_ANNOTATION_CHANGED",
            VerifierStatus::ParentClassChanged => "PARENT_CLASS_CHANGED",
            VerifierStatus::ImplementedInterfacesChanged => "IMPLEMENTED_INTERFACES_CHANGED",
            VerifierStatus::ReflectionUsed => "REFLECTION_USED",
            VerifierStatus::ResourcesChanged => "RESOURCES_CHANGED",
            VerifierStatus::JavaResourcesChanged => "JAVA_RESOURCES_CHANGED",
            VerifierStatus::ManifestChanged => "MANIFEST_CHANGED",
            VerifierStatus::BinaryManifestChanged => "BINARY_MANIFEST_CHANGED",
            VerifierStatus::DependencyChanged => "DEPENDENCY_CHANGED",
            VerifierStatus::ApiLevelChanged => "API_LEVEL_CHANGED",
            VerifierStatus::FullBuildRequested => "FULL_BUILD_REQUESTED",
            VerifierStatus::ColdSwapRequested => "COLD_SWAP_REQUESTED",
        }
    }

    /// Parse a persisted status name.
    pub fn from_name(name: &str) -> Option<VerifierStatus> {
        ALL_STATUSES.iter().find(|s| s.as_str() == name).copied()
    }
}

impl fmt::Display for VerifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every verifier status, in declaration order.
pub const ALL_STATUSES: [VerifierStatus; 26] = [
    VerifierStatus::NoChanges,
    VerifierStatus::Compatible,
    VerifierStatus::InitialBuild,
    VerifierStatus::MethodAdded,
    VerifierStatus::MethodRemoved,
    VerifierStatus::MethodSignatureChanged,
    VerifierStatus::MethodAnnotationChanged,
    VerifierStatus::FieldAdded,
    VerifierStatus::FieldRemoved,
    VerifierStatus::FieldTypeChanged,
    VerifierStatus::StaticInitializerChanged,
    VerifierStatus::ConstructorSignatureChanged,
    VerifierStatus::ClassAdded,
    VerifierStatus::ClassRemoved,
    VerifierStatus::ClassAnnotationChanged,
    VerifierStatus::ParentClassChanged,
    VerifierStatus::ImplementedInterfacesChanged,
    VerifierStatus::ReflectionUsed,
    VerifierStatus::ResourcesChanged,
    VerifierStatus::JavaResourcesChanged,
    VerifierStatus::ManifestChanged,
    VerifierStatus::BinaryManifestChanged,
    VerifierStatus::DependencyChanged,
    VerifierStatus::ApiLevelChanged,
    VerifierStatus::FullBuildRequested,
    VerifierStatus::ColdSwapRequested,
];

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn combine_keeps_more_severe() {
        assert_eq!(
            BuildMode::HotWarm.combine(BuildMode::Cold),
            BuildMode::Cold
        );
        assert_eq!(BuildMode::Cold.combine(BuildMode::HotWarm), BuildMode::Cold);
        assert_eq!(BuildMode::Full.combine(BuildMode::Cold), BuildMode::Full);
        assert_eq!(
            BuildMode::HotWarm.combine(BuildMode::HotWarm),
            BuildMode::HotWarm
        );
    }

    #[test]
    fn full_cannot_be_downgraded() {
        let mut mode = BuildMode::Full;
        for other in [BuildMode::HotWarm, BuildMode::Cold, BuildMode::Full] {
            mode = mode.combine(other);
            assert_eq!(mode, BuildMode::Full);
        }
    }

    #[test]
    fn mode_name_round_trip() {
        for mode in [BuildMode::HotWarm, BuildMode::Cold, BuildMode::Full] {
            assert_eq!(BuildMode::from_name(mode.as_str()), Some(mode));
        }
        assert_eq!(BuildMode::from_name("WARM"), None);
    }

    #[test]
    fn resolve_disabled_is_unknown() {
        assert_eq!(
            PatchingPolicy::resolve(26, true, false),
            PatchingPolicy::Unknown
        );
    }

    #[test]
    fn resolve_old_device_is_unknown() {
        assert_eq!(
            PatchingPolicy::resolve(19, false, true),
            PatchingPolicy::Unknown
        );
    }

    #[test]
    fn resolve_picks_resources_split() {
        assert_eq!(
            PatchingPolicy::resolve(26, true, true),
            PatchingPolicy::MultiApkSeparateResources
        );
        assert_eq!(
            PatchingPolicy::resolve(23, false, true),
            PatchingPolicy::MultiApk
        );
    }

    #[test]
    fn hot_swappable_statuses_stay_hot() {
        assert_eq!(
            VerifierStatus::Compatible.required_mode(PatchingPolicy::MultiApk),
            BuildMode::HotWarm
        );
        assert_eq!(
            VerifierStatus::NoChanges.required_mode(PatchingPolicy::MultiApk),
            BuildMode::HotWarm
        );
    }

    #[test]
    fn incompatible_change_requires_cold() {
        assert_eq!(
            VerifierStatus::MethodAdded.required_mode(PatchingPolicy::MultiApk),
            BuildMode::Cold
        );
        assert_eq!(
            VerifierStatus::ResourcesChanged
                .required_mode(PatchingPolicy::MultiApkSeparateResources),
            BuildMode::Cold
        );
    }

    #[test]
    fn initial_build_requires_full() {
        assert_eq!(
            VerifierStatus::InitialBuild.required_mode(PatchingPolicy::MultiApk),
            BuildMode::Full
        );
        assert_eq!(
            VerifierStatus::ManifestChanged.required_mode(PatchingPolicy::MultiApk),
            BuildMode::Full
        );
    }

    #[test]
    fn unknown_policy_forces_full_for_everything() {
        for status in ALL_STATUSES {
            assert_eq!(
                status.required_mode(PatchingPolicy::Unknown),
                BuildMode::Full,
                "status {status} should map to FULL under UNKNOWN"
            );
        }
    }

    #[test]
    fn status_name_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(VerifierStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(VerifierStatus::from_name("NOT_A_STATUS"), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_mode() -> impl Strategy<Value = BuildMode> {
            prop_oneof![
                Just(BuildMode::HotWarm),
                Just(BuildMode::Cold),
                Just(BuildMode::Full),
            ]
        }

        proptest! {
            #[test]
            fn combine_is_monotonic(a in any_mode(), b in any_mode()) {
                let combined = a.combine(b);
                prop_assert!(combined >= a);
                prop_assert!(combined >= b);
            }

            #[test]
            fn combine_is_commutative(a in any_mode(), b in any_mode()) {
                prop_assert_eq!(a.combine(b), b.combine(a));
            }

            #[test]
            fn combine_is_associative(a in any_mode(), b in any_mode(), c in any_mode()) {
                prop_assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
            }
        }
    }
}
