//! Thread-safe facade over [`BuildContext`] for the parallel task graph.
//!
//! Verifier tasks and packagers run concurrently; each mutation takes the
//! lock for one call, so interleaved registrations stay atomic.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fastdeploy_model::{Build, FileType, VerifierStatus};

use crate::context::BuildContext;
use crate::error::EngineError;
use crate::timing::TaskType;

/// Cheaply clonable handle sharing one [`BuildContext`].
#[derive(Clone)]
pub struct SharedBuildContext {
    inner: Arc<Mutex<BuildContext>>,
}

impl SharedBuildContext {
    pub fn new(context: BuildContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuildContext> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_verifier_status(&self, status: VerifierStatus) {
        self.lock().set_verifier_status(status);
    }

    pub fn was_status_observed(&self, status: VerifierStatus) -> bool {
        self.lock().was_status_observed(status)
    }

    pub fn add_changed_file(&self, file_type: FileType, location: impl Into<PathBuf>) {
        self.lock().add_changed_file(file_type, location);
    }

    pub fn set_build_failed(&self, failed: bool) {
        self.lock().set_build_failed(failed);
    }

    pub fn start_recording(&self, task: TaskType) {
        self.lock().start_recording(task);
    }

    pub fn stop_recording(&self, task: TaskType) {
        self.lock().stop_recording(task);
    }

    /// Snapshot of the current build.
    pub fn current_build(&self) -> Build {
        self.lock().current_build().clone()
    }

    /// Finalize the build. See [`BuildContext::close`].
    ///
    /// # Errors
    /// Propagates [`BuildContext::close`] errors.
    pub fn close(&self) -> Result<(), EngineError> {
        self.lock().close()
    }

    /// Persist to `build_dir`. See [`BuildContext::persist`].
    ///
    /// # Errors
    /// Propagates [`BuildContext::persist`] errors.
    pub fn persist(&self, build_dir: &Path) -> Result<(), EngineError> {
        self.lock().persist(build_dir)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use fastdeploy_model::BuildMode;

    use super::*;
    use crate::context::ContextOptions;

    #[test]
    fn concurrent_registrations_are_all_recorded() {
        let shared = SharedBuildContext::new(BuildContext::new(ContextOptions::new(24)));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let shared = shared.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    shared.add_changed_file(FileType::Split, format!("/out/split-{i}.apk"));
                    shared.set_verifier_status(VerifierStatus::MethodAdded);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let build = shared.current_build();
        assert_eq!(build.artifacts.len(), threads);
        assert_eq!(build.build_mode, BuildMode::Cold);
        assert_eq!(build.verifier_status, Some(VerifierStatus::MethodAdded));
    }

    #[test]
    fn duplicate_registrations_race_to_one_artifact() {
        let shared = SharedBuildContext::new(BuildContext::new(ContextOptions::new(24)));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let shared = shared.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    shared.add_changed_file(FileType::Split, "/out/same.apk");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.current_build().artifacts.len(), 1);
    }
}
