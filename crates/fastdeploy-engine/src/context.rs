//! The per-invocation build context: verifier outcome tracking, artifact
//! registration, history persistence, and close-time finalization.
//!
//! One context is constructed per build-tool invocation. It loads the
//! persisted history, collects verifier outcomes and changed files while
//! the task graph runs, and on `close()` purges the history down to what a
//! connected device still needs to catch up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fastdeploy_model::{Artifact, Build, BuildMode, FileType, PatchingPolicy, VerifierStatus};
use fastdeploy_util::{fs, hash};

use crate::clock::{Clock, SystemClock};
use crate::error::EngineError;
use crate::log::{DeployLog, NoopLog};
use crate::purge::purge_history;
use crate::report::DeploymentReport;
use crate::timing::{TaskRecorder, TaskType};
use crate::xml::{
    self, BuildInfoDoc, BuildInfoView, PersistenceMode, FORMAT_VERSION, BUILD_INFO_FILE_NAME,
    TMP_BUILD_INFO_FILE_NAME,
};

/// Device and invocation parameters fixed for the lifetime of a context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Version stamped into persisted files; a mismatch on load discards
    /// history.
    pub plugin_version: String,
    /// API level of the connected device.
    pub api_level: u32,
    /// Screen density of the connected device, if known.
    pub density: Option<String>,
    /// ABI of the connected device, if known.
    pub abi: Option<String>,
    /// Whether incremental deploy is enabled for this invocation.
    pub instant_run_mode: bool,
    /// Whether resources ship as a separate split on this device.
    pub separate_resources: bool,
}

impl ContextOptions {
    pub fn new(api_level: u32) -> Self {
        Self {
            plugin_version: env!("CARGO_PKG_VERSION").to_owned(),
            api_level,
            density: None,
            abi: None,
            instant_run_mode: true,
            separate_resources: false,
        }
    }
}

/// The build context state machine.
pub struct BuildContext {
    options: ContextOptions,
    policy: PatchingPolicy,
    clock: Arc<dyn Clock>,
    log: Arc<dyn DeployLog>,
    current: Build,
    /// Prior builds keyed by build id; never contains the current build.
    previous_builds: BTreeMap<u64, Build>,
    token: Option<u64>,
    build_failed: bool,
    closed: bool,
    recorder: TaskRecorder,
}

impl BuildContext {
    /// Create a context with the system clock and no diagnostics sink.
    pub fn new(options: ContextOptions) -> Self {
        Self::with_parts(options, Arc::new(SystemClock), Arc::new(NoopLog))
    }

    /// Create a context with injected clock and diagnostics sink.
    pub fn with_parts(
        options: ContextOptions,
        clock: Arc<dyn Clock>,
        log: Arc<dyn DeployLog>,
    ) -> Self {
        let policy = PatchingPolicy::resolve(
            options.api_level,
            options.separate_resources,
            options.instant_run_mode,
        );
        let current = Build::new(clock.now_millis());
        Self {
            options,
            policy,
            clock,
            log,
            current,
            previous_builds: BTreeMap::new(),
            token: None,
            build_failed: false,
            closed: false,
            recorder: TaskRecorder::new(),
        }
    }

    pub fn policy(&self) -> PatchingPolicy {
        self.policy
    }

    pub fn current_build(&self) -> &Build {
        &self.current
    }

    /// Prior builds, oldest first. Never includes the current build.
    pub fn previous_builds(&self) -> impl Iterator<Item = &Build> {
        self.previous_builds.values()
    }

    pub fn token(&self) -> Option<u64> {
        self.token
    }

    /// Override the session token, replacing any loaded or minted one.
    pub fn set_token(&mut self, token: u64) {
        self.token = Some(token);
    }

    pub fn build_failed(&self) -> bool {
        self.build_failed
    }

    /// Mark the build as failed; `persist` will then write a recovery
    /// snapshot instead of the main history file.
    pub fn set_build_failed(&mut self, failed: bool) {
        self.build_failed = failed;
    }

    /// Record the eligibility outcome reported by the IDE handshake.
    pub fn set_eligibility(&mut self, status: VerifierStatus) {
        self.current.eligibility = Some(status);
    }

    /// Report a verifier outcome for the current build.
    ///
    /// Every outcome is remembered; the winning status is replaced when
    /// none is set yet, when the standing one is hot-swappable, or when
    /// the new outcome escalates the build mode. The build mode itself
    /// only ever moves up the lattice.
    pub fn set_verifier_status(&mut self, status: VerifierStatus) {
        self.current.record_status(status);
        let new_mode = status.required_mode(self.policy);
        let replace = match self.current.verifier_status {
            None => true,
            Some(existing) => existing.is_hot_swappable() || new_mode > self.current.build_mode,
        };
        if replace {
            self.current.verifier_status = Some(status);
        }
        self.current.build_mode = self.current.build_mode.combine(new_mode);
    }

    /// Whether `status` was reported at any point during this build.
    pub fn was_status_observed(&self, status: VerifierStatus) -> bool {
        self.current.was_status_observed(status)
    }

    /// Register a file produced by the current build.
    ///
    /// The first artifact of an otherwise-unchanged build escalates the
    /// status to `Compatible`. A `Main` registration is stored as
    /// `SplitMain`, superseding any earlier main split and, when the
    /// policy does not ship separate resources, any resources artifact.
    pub fn add_changed_file(&mut self, file_type: FileType, location: impl Into<PathBuf>) {
        let candidate = Artifact::new(file_type, location);
        if self.current.artifacts.is_empty()
            && matches!(
                self.current.verifier_status,
                None | Some(VerifierStatus::NoChanges)
            )
        {
            self.set_verifier_status(VerifierStatus::Compatible);
        }
        if self.current.has_artifact(&candidate) {
            return;
        }
        let artifact = if candidate.file_type == FileType::Main {
            self.current.remove_artifacts_of_type(FileType::SplitMain);
            if !self.policy.uses_separate_resources() {
                self.current.remove_artifacts_of_type(FileType::Resources);
            }
            Artifact::new(FileType::SplitMain, candidate.location)
        } else {
            candidate
        };
        if !self.current.has_artifact(&artifact) {
            self.current.artifacts.push(artifact);
        }
    }

    /// Mint the session token from the output directory contents if none
    /// was carried over from the persisted history.
    ///
    /// # Errors
    /// Returns an error if the output directory cannot be walked.
    pub fn ensure_secret_token(&mut self, output_dir: &Path) -> Result<u64, EngineError> {
        if let Some(token) = self.token {
            return Ok(token);
        }
        let token = hash::token_from_dir(output_dir)?;
        self.token = Some(token);
        Ok(token)
    }

    /// Begin timing a pipeline task.
    pub fn start_recording(&mut self, task: TaskType) {
        let now = self.clock.now_millis();
        self.recorder.start(task, now);
    }

    /// Finish timing a pipeline task. A stop with no matching start is
    /// logged and ignored.
    pub fn stop_recording(&mut self, task: TaskType) {
        let now = self.clock.now_millis();
        if self.recorder.stop(task, now).is_none() {
            self.log.debug(&format!("no start recorded for task {task}"));
        }
    }

    /// Accumulated per-task millis for this build.
    pub fn task_durations(&self) -> &BTreeMap<TaskType, u64> {
        self.recorder.durations()
    }

    /// Finalize the build: run the history purge exactly once.
    ///
    /// # Errors
    /// Returns [`EngineError::Invariant`] if a full-build collapse would
    /// leave the current build with no artifacts.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut builds = std::mem::take(&mut self.previous_builds);
        builds.insert(self.current.build_id, self.current.clone());
        purge_history(
            &mut builds,
            self.current.build_id,
            self.policy,
            self.options.api_level,
            self.log.as_ref(),
        )?;
        if let Some(current) = builds.remove(&self.current.build_id) {
            self.current = current;
        }
        self.previous_builds = builds;
        Ok(())
    }

    /// Serialize this context to the persisted XML format.
    pub fn to_xml(&self, mode: PersistenceMode) -> String {
        let view = BuildInfoView {
            plugin_version: &self.options.plugin_version,
            instant_run_mode: self.options.instant_run_mode,
            api_level: self.options.api_level,
            density: self.options.density.as_deref(),
            abi: self.options.abi.as_deref(),
            token: self.token,
            task_durations: self.recorder.durations(),
            current: &self.current,
            history_newest_first: self.previous_builds.values().rev().collect(),
        };
        xml::serialize(&view, mode)
    }

    /// Write the context to `build_dir`.
    ///
    /// A failed build leaves `build-info.xml` untouched and writes a
    /// `tmp-build-info.xml` recovery snapshot carrying only the current
    /// build; a successful one writes the history atomically and removes
    /// any stale snapshot.
    ///
    /// # Errors
    /// Returns an error if the directory or files cannot be written.
    pub fn persist(&self, build_dir: &Path) -> Result<(), EngineError> {
        fs::ensure_dir(build_dir)?;
        let tmp_path = build_dir.join(TMP_BUILD_INFO_FILE_NAME);
        if self.build_failed {
            fs::write_atomic(&tmp_path, &self.to_xml(PersistenceMode::TempBuild))?;
            return Ok(());
        }
        let mode = if self.current.build_mode == BuildMode::Full {
            PersistenceMode::FullBuild
        } else {
            PersistenceMode::IncrementalBuild
        };
        fs::write_atomic(
            &build_dir.join(BUILD_INFO_FILE_NAME),
            &self.to_xml(mode),
        )?;
        fs::remove_file_if_exists(&tmp_path)?;
        Ok(())
    }

    /// Load persisted history from `build_dir`, then fold in a crash
    /// snapshot if one was left behind.
    ///
    /// An unreadable or stale snapshot is discarded with a log line; the
    /// main history file propagates its errors.
    ///
    /// # Errors
    /// Returns an error if `build-info.xml` exists but cannot be read or
    /// is corrupt.
    pub fn load(&mut self, build_dir: &Path) -> Result<(), EngineError> {
        self.load_from_file(&build_dir.join(BUILD_INFO_FILE_NAME))?;
        let tmp_path = build_dir.join(TMP_BUILD_INFO_FILE_NAME);
        match self.merge_from_file(&tmp_path) {
            Ok(()) => {}
            Err(e @ (EngineError::Corrupt { .. } | EngineError::VersionMismatch { .. })) => {
                self.log.debug(&format!("discarding recovery snapshot: {e}"));
            }
            Err(e) => return Err(e),
        }
        fs::remove_file_if_exists(&tmp_path)?;
        Ok(())
    }

    /// Load persisted history from a specific build-info file.
    ///
    /// An absent file and a format or plugin-version mismatch both reset
    /// the context to an initial build; mismatches additionally discard
    /// whatever history the file carried.
    ///
    /// # Errors
    /// Returns [`EngineError::Corrupt`] if the file exists but does not
    /// match the schema.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let Some(content) = fs::read_if_exists(path)? else {
            self.reset_to_initial_build();
            return Ok(());
        };
        let doc = xml::parse(&content, &path.display().to_string())?;
        if let Err(mismatch) = self.check_version(&doc) {
            self.log.debug(&format!("discarding history: {mismatch}"));
            self.reset_to_initial_build();
            return Ok(());
        }
        self.seed_from_doc(doc);
        Ok(())
    }

    /// Fold the artifacts of a recovery snapshot into the current build,
    /// skipping artifacts already registered.
    ///
    /// # Errors
    /// Returns [`EngineError::Corrupt`] or [`EngineError::VersionMismatch`]
    /// for snapshots this version cannot use.
    pub fn merge_from_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let Some(content) = fs::read_if_exists(path)? else {
            return Ok(());
        };
        let doc = xml::parse(&content, &path.display().to_string())?;
        self.check_version(&doc)?;
        self.merge_from(&doc);
        Ok(())
    }

    /// Fold a parsed snapshot's newest build into the current build.
    pub fn merge_from(&mut self, doc: &BuildInfoDoc) {
        let Some(recovered) = doc.builds.first() else {
            return;
        };
        for artifact in &recovered.artifacts {
            if !self.current.has_artifact(artifact) {
                self.current.artifacts.push(artifact.clone());
            }
        }
    }

    /// Build the scrubbed analytics summary for this invocation.
    pub fn deployment_report(&self) -> DeploymentReport {
        DeploymentReport::from_build(
            &self.current,
            self.policy,
            self.recorder.durations(),
        )
    }

    fn check_version(&self, doc: &BuildInfoDoc) -> Result<(), EngineError> {
        if doc.format != FORMAT_VERSION {
            return Err(EngineError::VersionMismatch {
                expected: FORMAT_VERSION.to_owned(),
                found: doc.format.clone(),
            });
        }
        if doc.plugin_version != self.options.plugin_version {
            return Err(EngineError::VersionMismatch {
                expected: self.options.plugin_version.clone(),
                found: doc.plugin_version.clone(),
            });
        }
        Ok(())
    }

    fn seed_from_doc(&mut self, doc: BuildInfoDoc) {
        if self.token.is_none() {
            self.token = doc.token;
        }
        self.previous_builds.clear();
        let mut newest = 0;
        for build in doc.builds {
            newest = newest.max(build.build_id);
            self.previous_builds.insert(build.build_id, build);
        }
        // Build ids must stay monotonic even if the wall clock went
        // backwards since the last invocation.
        if self.current.build_id <= newest {
            self.current.build_id = newest + 1;
        }
    }

    fn reset_to_initial_build(&mut self) {
        self.previous_builds.clear();
        self.set_verifier_status(VerifierStatus::InitialBuild);
    }
}
