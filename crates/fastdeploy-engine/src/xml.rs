//! The persisted build-info schema: a hand-built serializer and a
//! defensive `roxmltree` parser.
//!
//! The build tool does not stay resident between invocations, so this file
//! is the only carrier of artifact history. A *missing* file is a normal
//! state (first build); a *malformed* file is not, and parsing is strict —
//! with the single exception of version mismatches, which the load path
//! resolves by discarding history rather than failing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use fastdeploy_model::{Artifact, Build, BuildMode, FileType, VerifierStatus};

use crate::error::EngineError;
use crate::timing::TaskType;

/// Name of the persisted build-info file inside the build directory.
pub const BUILD_INFO_FILE_NAME: &str = "build-info.xml";

/// Name of the crash-recovery snapshot written when a build fails.
pub const TMP_BUILD_INFO_FILE_NAME: &str = "tmp-build-info.xml";

/// Schema version of the persisted file. Bumped on incompatible changes;
/// a mismatch discards history instead of attempting migration.
pub const FORMAT_VERSION: &str = "2";

/// How much history a serialization carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Only the single most recent prior build, besides the current one.
    FullBuild,
    /// The entire history.
    IncrementalBuild,
    /// No history at all; used for crash-recovery snapshots.
    TempBuild,
}

/// A parsed build-info document, uninterpreted: version checks and history
/// seeding are the context's concern.
#[derive(Debug)]
pub struct BuildInfoDoc {
    pub plugin_version: String,
    pub format: String,
    pub api_level: Option<u32>,
    pub density: Option<String>,
    pub abi: Option<String>,
    pub token: Option<u64>,
    /// Task name and elapsed millis, in document order. Names are kept raw
    /// so files from other plugin versions can still be inspected.
    pub task_durations: Vec<(String, u64)>,
    /// Builds in document order: the current build first, history after.
    pub builds: Vec<Build>,
}

/// Borrowed view of a context, ready to serialize.
pub(crate) struct BuildInfoView<'a> {
    pub plugin_version: &'a str,
    pub instant_run_mode: bool,
    pub api_level: u32,
    pub density: Option<&'a str>,
    pub abi: Option<&'a str>,
    pub token: Option<u64>,
    pub task_durations: &'a BTreeMap<TaskType, u64>,
    pub current: &'a Build,
    /// Prior builds, newest first, current excluded.
    pub history_newest_first: Vec<&'a Build>,
}

/// Serialize a build-info document.
pub(crate) fn serialize(view: &BuildInfoView<'_>, mode: PersistenceMode) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<instant-run");
    push_attr(&mut out, "plugin-version", view.plugin_version);
    push_attr(&mut out, "format", FORMAT_VERSION);
    if view.instant_run_mode {
        push_attr(&mut out, "api-level", &view.api_level.to_string());
        if let Some(density) = view.density {
            push_attr(&mut out, "density", density);
        }
        if let Some(abi) = view.abi {
            push_attr(&mut out, "abi", abi);
        }
        if let Some(token) = view.token {
            push_attr(&mut out, "token", &token.to_string());
        }
    }
    out.push_str(">\n");

    for (task, duration) in view.task_durations {
        let _ = writeln!(
            out,
            "  <task name=\"{}\" duration=\"{duration}\"/>",
            task.as_str()
        );
    }

    write_build(&mut out, view.current);
    let history_count = match mode {
        PersistenceMode::FullBuild => 1,
        PersistenceMode::IncrementalBuild => view.history_newest_first.len(),
        PersistenceMode::TempBuild => 0,
    };
    for build in view.history_newest_first.iter().take(history_count) {
        write_build(&mut out, build);
    }

    out.push_str("</instant-run>\n");
    out
}

fn write_build(out: &mut String, build: &Build) {
    out.push_str("  <build");
    push_attr(out, "timestamp", &build.build_id.to_string());
    push_attr(out, "build-mode", build.build_mode.as_str());
    if let Some(status) = build.verifier_status {
        push_attr(out, "verifier", status.as_str());
    }
    if let Some(eligibility) = build.eligibility {
        push_attr(out, "ir-eligibility", eligibility.as_str());
    }
    if build.artifacts.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    for artifact in &build.artifacts {
        out.push_str("    <artifact");
        push_attr(out, "type", artifact.file_type.as_str());
        push_attr(out, "location", &artifact.location.display().to_string());
        out.push_str("/>\n");
    }
    out.push_str("  </build>\n");
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
}

/// Escape a string for use inside a double-quoted XML attribute.
fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Parse a build-info document.
///
/// `path` is only used for error context.
///
/// # Errors
/// Returns [`EngineError::Corrupt`] for anything that is not a well-formed
/// document matching the schema. Version checks are not performed here.
pub fn parse(xml: &str, path: &str) -> Result<BuildInfoDoc, EngineError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| corrupt(path, &e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "instant-run" {
        return Err(corrupt(
            path,
            &format!("unexpected root element `{}`", root.tag_name().name()),
        ));
    }

    let plugin_version = required_attr(root, "plugin-version", path)?.to_owned();
    let format = required_attr(root, "format", path)?.to_owned();
    let api_level = optional_u32_attr(root, "api-level", path)?;
    let token = optional_u64_attr(root, "token", path)?;
    let density = root.attribute("density").map(str::to_owned);
    let abi = root.attribute("abi").map(str::to_owned);

    let mut task_durations = Vec::new();
    let mut builds = Vec::new();
    for child in root.children().filter(roxmltree::Node::is_element) {
        match child.tag_name().name() {
            "task" => {
                let name = required_attr(child, "name", path)?.to_owned();
                let duration = required_u64_attr(child, "duration", path)?;
                task_durations.push((name, duration));
            }
            "build" => builds.push(parse_build(child, path)?),
            other => {
                return Err(corrupt(path, &format!("unexpected element `{other}`")));
            }
        }
    }

    Ok(BuildInfoDoc {
        plugin_version,
        format,
        api_level,
        density,
        abi,
        token,
        task_durations,
        builds,
    })
}

fn parse_build(node: roxmltree::Node<'_, '_>, path: &str) -> Result<Build, EngineError> {
    let build_id = required_u64_attr(node, "timestamp", path)?;
    let mut build = Build::new(build_id);

    let mode_name = required_attr(node, "build-mode", path)?;
    build.build_mode = BuildMode::from_name(mode_name)
        .ok_or_else(|| corrupt(path, &format!("unknown build mode `{mode_name}`")))?;

    if let Some(status_name) = node.attribute("verifier") {
        let status = VerifierStatus::from_name(status_name)
            .ok_or_else(|| corrupt(path, &format!("unknown verifier status `{status_name}`")))?;
        build.verifier_status = Some(status);
    }
    if let Some(eligibility_name) = node.attribute("ir-eligibility") {
        let eligibility = VerifierStatus::from_name(eligibility_name).ok_or_else(|| {
            corrupt(path, &format!("unknown eligibility status `{eligibility_name}`"))
        })?;
        build.eligibility = Some(eligibility);
    }

    for child in node.children().filter(roxmltree::Node::is_element) {
        if child.tag_name().name() != "artifact" {
            return Err(corrupt(
                path,
                &format!("unexpected element `{}` in build", child.tag_name().name()),
            ));
        }
        let type_name = required_attr(child, "type", path)?;
        let file_type = FileType::from_name(type_name)
            .ok_or_else(|| corrupt(path, &format!("unknown artifact type `{type_name}`")))?;
        let location = required_attr(child, "location", path)?;
        let artifact = Artifact::new(file_type, location);
        if !build.has_artifact(&artifact) {
            build.artifacts.push(artifact);
        }
    }

    Ok(build)
}

fn required_attr<'a>(
    node: roxmltree::Node<'a, '_>,
    name: &str,
    path: &str,
) -> Result<&'a str, EngineError> {
    node.attribute(name)
        .ok_or_else(|| corrupt(path, &format!("missing `{name}` attribute")))
}

fn required_u64_attr(
    node: roxmltree::Node<'_, '_>,
    name: &str,
    path: &str,
) -> Result<u64, EngineError> {
    let raw = required_attr(node, name, path)?;
    raw.parse::<u64>()
        .map_err(|_| corrupt(path, &format!("`{name}` is not a number: `{raw}`")))
}

fn optional_u64_attr(
    node: roxmltree::Node<'_, '_>,
    name: &str,
    path: &str,
) -> Result<Option<u64>, EngineError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| corrupt(path, &format!("`{name}` is not a number: `{raw}`"))),
    }
}

fn optional_u32_attr(
    node: roxmltree::Node<'_, '_>,
    name: &str,
    path: &str,
) -> Result<Option<u32>, EngineError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| corrupt(path, &format!("`{name}` is not a number: `{raw}`"))),
    }
}

fn corrupt(path: &str, message: &str) -> EngineError {
    EngineError::Corrupt {
        path: path.to_owned(),
        message: message.to_owned(),
    }
}
