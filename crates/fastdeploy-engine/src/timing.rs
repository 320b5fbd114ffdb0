//! Per-task elapsed-time recording, persisted as `task` elements.

use std::collections::BTreeMap;
use std::fmt;

/// Build-pipeline task types whose elapsed time is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskType {
    Verifier,
    DexBuild,
    DexMerge,
    ResourceLink,
    Packaging,
    Signing,
}

impl TaskType {
    /// Stable name used in the persisted build-info file.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Verifier => "VERIFIER",
            TaskType::DexBuild => "DEX_BUILD",
            TaskType::DexMerge => "DEX_MERGE",
            TaskType::ResourceLink => "RESOURCE_LINK",
            TaskType::Packaging => "PACKAGING",
            TaskType::Signing => "SIGNING",
        }
    }

    /// Parse a persisted task name.
    pub fn from_name(name: &str) -> Option<TaskType> {
        match name {
            "VERIFIER" => Some(TaskType::Verifier),
            "DEX_BUILD" => Some(TaskType::DexBuild),
            "DEX_MERGE" => Some(TaskType::DexMerge),
            "RESOURCE_LINK" => Some(TaskType::ResourceLink),
            "PACKAGING" => Some(TaskType::Packaging),
            "SIGNING" => Some(TaskType::Signing),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates elapsed millis per task across start/stop pairs.
///
/// External task wrappers call start/stop around each task execution; a
/// task type can run more than once per build, in which case durations
/// accumulate.
#[derive(Debug, Default)]
pub struct TaskRecorder {
    started: BTreeMap<TaskType, u64>,
    durations: BTreeMap<TaskType, u64>,
}

impl TaskRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `task` as started at `now_millis`. A second start before the
    /// matching stop restarts the measurement.
    pub fn start(&mut self, task: TaskType, now_millis: u64) {
        self.started.insert(task, now_millis);
    }

    /// Mark `task` as stopped at `now_millis`, accumulating its elapsed
    /// time. Returns `None` for a stop with no matching start.
    pub fn stop(&mut self, task: TaskType, now_millis: u64) -> Option<u64> {
        let started_at = self.started.remove(&task)?;
        let elapsed = now_millis.saturating_sub(started_at);
        *self.durations.entry(task).or_insert(0) += elapsed;
        Some(elapsed)
    }

    /// Accumulated durations, ordered by task type.
    pub fn durations(&self) -> &BTreeMap<TaskType, u64> {
        &self.durations
    }
}
