//! Scrubbed per-deploy analytics summary and the sink it is sent to.
//!
//! The report carries categorical data only: modes, policies, status and
//! artifact-type names, and task millis. No file paths or other
//! workspace-identifying strings leave the machine.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;

use fastdeploy_model::{Build, PatchingPolicy};
use serde::Serialize;

use crate::log::DeployLog;
use crate::timing::TaskType;

/// One deploy's summary, ready to serialize as a JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub build_id: u64,
    pub build_mode: String,
    pub patching_policy: String,
    pub verifier_status: Option<String>,
    /// Types of the artifacts the build produced, in registration order,
    /// with duplicates kept.
    pub artifact_types: Vec<String>,
    /// Task name to accumulated millis.
    pub task_millis: BTreeMap<String, u64>,
}

impl DeploymentReport {
    pub(crate) fn from_build(
        build: &Build,
        policy: PatchingPolicy,
        durations: &BTreeMap<TaskType, u64>,
    ) -> Self {
        Self {
            build_id: build.build_id,
            build_mode: build.build_mode.as_str().to_owned(),
            patching_policy: policy.as_str().to_owned(),
            verifier_status: build.verifier_status.map(|s| s.as_str().to_owned()),
            artifact_types: build
                .artifacts
                .iter()
                .map(|a| a.file_type.as_str().to_owned())
                .collect(),
            task_millis: durations
                .iter()
                .map(|(task, millis)| (task.as_str().to_owned(), *millis))
                .collect(),
        }
    }
}

/// Destination for deployment reports.
pub trait ReportSink: Send + Sync {
    /// Deliver one report.
    ///
    /// # Errors
    /// Returns an error if the report could not be delivered.
    fn send(&self, report: &DeploymentReport) -> std::io::Result<()>;
}

/// Discards every report. The default.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ReportSink for NoopSink {
    fn send(&self, _report: &DeploymentReport) -> std::io::Result<()> {
        Ok(())
    }
}

/// Appends each report as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonLinesSink {
    fn send(&self, report: &DeploymentReport) -> std::io::Result<()> {
        let line = serde_json::to_string(report).map_err(std::io::Error::other)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Deliver a report fire-and-forget: a sink failure is logged and
/// swallowed, never failing the build.
pub fn submit(sink: &dyn ReportSink, report: &DeploymentReport, log: &dyn DeployLog) {
    if let Err(e) = sink.send(report) {
        log.debug(&format!("deployment report dropped: {e}"));
    }
}
