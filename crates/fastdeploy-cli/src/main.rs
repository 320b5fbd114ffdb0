#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use fastdeploy_engine::xml::{self, BuildInfoDoc};
use fastdeploy_model::FileType;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "fastdeploy", about = "Inspect incremental-deploy build history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarize a build-info file
    Inspect {
        /// Path to a build-info.xml file
        file: PathBuf,
    },
    /// Print the newest build's artifact locations, one per line
    Artifacts {
        /// Path to a build-info.xml file
        file: PathBuf,
        /// Only print artifacts of this type (e.g. SPLIT, SPLIT_MAIN)
        #[arg(long, value_name = "TYPE")]
        r#type: Option<String>,
    },
    /// Print recorded per-task durations
    Timings {
        /// Path to a build-info.xml file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Inspect { file } => cmd_inspect(&file),
        Command::Artifacts { file, r#type } => cmd_artifacts(&file, type_filter(r#type)),
        Command::Timings { file } => cmd_timings(&file),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn type_filter(name: Option<String>) -> Option<Result<FileType, String>> {
    name.map(|n| FileType::from_name(&n).ok_or(n))
}

fn load_doc(file: &Path) -> Result<BuildInfoDoc, Box<dyn Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot access {}: {e}", file.display()))?;
    Ok(xml::parse(&content, &file.display().to_string())?)
}

fn cmd_inspect(file: &Path) -> CliResult {
    let doc = load_doc(file)?;

    println!("plugin-version: {}", doc.plugin_version);
    println!("format: {}", doc.format);
    if let Some(api_level) = doc.api_level {
        println!("api-level: {api_level}");
    }
    if let Some(ref density) = doc.density {
        println!("density: {density}");
    }
    if let Some(ref abi) = doc.abi {
        println!("abi: {abi}");
    }
    println!(
        "token: {}",
        if doc.token.is_some() { "set" } else { "unset" }
    );
    println!("builds: {}", doc.builds.len());
    for build in &doc.builds {
        let status = build
            .verifier_status
            .map_or("-", fastdeploy_model::VerifierStatus::as_str);
        println!(
            "  {} mode={} verifier={status} artifacts={}",
            build.build_id,
            build.build_mode.as_str(),
            build.artifacts.len()
        );
    }
    Ok(())
}

fn cmd_artifacts(file: &Path, filter: Option<Result<FileType, String>>) -> CliResult {
    let filter = match filter {
        Some(Ok(file_type)) => Some(file_type),
        Some(Err(name)) => return Err(format!("unknown artifact type `{name}`").into()),
        None => None,
    };

    let doc = load_doc(file)?;
    let Some(newest) = doc.builds.first() else {
        return Err(format!("no builds recorded in {}", file.display()).into());
    };

    for artifact in &newest.artifacts {
        if filter.is_some_and(|t| t != artifact.file_type) {
            continue;
        }
        println!("{}\t{}", artifact.file_type.as_str(), artifact.location.display());
    }
    Ok(())
}

fn cmd_timings(file: &Path) -> CliResult {
    let doc = load_doc(file)?;
    if doc.task_durations.is_empty() {
        eprintln!("no task timings recorded");
        return Ok(());
    }
    for (name, millis) in &doc.task_durations {
        println!("{name}\t{millis}ms");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use clap::Parser;

    // ── Subcommand parsing ─────────────────────────────────────────

    #[test]
    fn parse_inspect() {
        let cli = Cli::try_parse_from(["fastdeploy", "inspect", "build-info.xml"]).unwrap();
        match cli.command {
            Command::Inspect { file } => {
                assert_eq!(file, PathBuf::from("build-info.xml"));
            }
            other => panic!("expected Inspect, got {other:?}"),
        }
    }

    #[test]
    fn parse_artifacts_defaults() {
        let cli = Cli::try_parse_from(["fastdeploy", "artifacts", "build-info.xml"]).unwrap();
        match cli.command {
            Command::Artifacts { file, r#type } => {
                assert_eq!(file, PathBuf::from("build-info.xml"));
                assert!(r#type.is_none());
            }
            other => panic!("expected Artifacts, got {other:?}"),
        }
    }

    #[test]
    fn parse_artifacts_with_type() {
        let args = ["fastdeploy", "artifacts", "build-info.xml", "--type", "SPLIT"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Artifacts { r#type, .. } => {
                assert_eq!(r#type.as_deref(), Some("SPLIT"));
            }
            other => panic!("expected Artifacts, got {other:?}"),
        }
    }

    #[test]
    fn parse_timings() {
        let cli = Cli::try_parse_from(["fastdeploy", "timings", "build-info.xml"]).unwrap();
        match cli.command {
            Command::Timings { file } => {
                assert_eq!(file, PathBuf::from("build-info.xml"));
            }
            other => panic!("expected Timings, got {other:?}"),
        }
    }

    #[test]
    fn type_filter_resolves_known_names() {
        match type_filter(Some("SPLIT_MAIN".to_owned())) {
            Some(Ok(FileType::SplitMain)) => {}
            other => panic!("expected SplitMain, got {other:?}"),
        }
        match type_filter(Some("DEX".to_owned())) {
            Some(Err(name)) => assert_eq!(name, "DEX"),
            other => panic!("expected Err, got {other:?}"),
        }
        assert!(type_filter(None).is_none());
    }

    // ── Invalid arguments ──────────────────────────────────────────

    #[test]
    fn error_no_subcommand() {
        let err = Cli::try_parse_from(["fastdeploy"]).unwrap_err();
        let expected = ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand;
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn error_unknown_subcommand() {
        let err = Cli::try_parse_from(["fastdeploy", "purge"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn error_inspect_missing_file() {
        let err = Cli::try_parse_from(["fastdeploy", "inspect"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn error_unknown_flag_on_timings() {
        let args = ["fastdeploy", "timings", "build-info.xml", "--json"];
        let err = Cli::try_parse_from(args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        let msg = err.to_string();
        assert!(msg.contains("--json"));
        assert!(msg.contains("Usage:"));
    }

    #[test]
    fn error_type_missing_value() {
        let args = ["fastdeploy", "artifacts", "build-info.xml", "--type"];
        let err = Cli::try_parse_from(args).unwrap_err();
        assert!(
            err.kind() == ErrorKind::InvalidValue
                || err.kind() == ErrorKind::MissingRequiredArgument
        );
    }

    // ── Help and version output ────────────────────────────────────

    #[test]
    fn help_flag_on_root() {
        let err = Cli::try_parse_from(["fastdeploy", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        let output = err.to_string();
        assert!(output.contains("Inspect incremental-deploy build history"));
        assert!(output.contains("Commands:"));
        assert!(output.contains("inspect"));
        assert!(output.contains("artifacts"));
        assert!(output.contains("timings"));
    }

    #[test]
    fn help_flag_on_artifacts() {
        let err = Cli::try_parse_from(["fastdeploy", "artifacts", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn version_flag() {
        let err = Cli::try_parse_from(["fastdeploy", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn root_help_render_includes_all_subcommands() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        for subcommand in ["inspect", "artifacts", "timings"] {
            assert!(help.contains(subcommand));
        }
    }

    // ── Command behavior against real files ────────────────────────

    #[test]
    fn inspect_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = cmd_inspect(&dir.path().join("missing.xml")).unwrap_err();
        assert!(err.to_string().contains("cannot access"));
    }

    #[test]
    fn artifacts_unknown_type_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("build-info.xml");
        std::fs::write(
            &path,
            "<instant-run plugin-version=\"1.2.0\" format=\"2\">\
             <build timestamp=\"1\" build-mode=\"COLD\"/>\
             </instant-run>",
        )
        .unwrap();
        let err = cmd_artifacts(&path, type_filter(Some("DEX".to_owned()))).unwrap_err();
        assert!(err.to_string().contains("unknown artifact type"));
    }

    #[test]
    fn inspect_corrupt_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("build-info.xml");
        std::fs::write(&path, "not xml at all").unwrap();
        assert!(cmd_inspect(&path).is_err());
    }

    #[test]
    fn artifacts_accepts_valid_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("build-info.xml");
        std::fs::write(
            &path,
            "<instant-run plugin-version=\"1.2.0\" format=\"2\">\
             <build timestamp=\"2\" build-mode=\"HOT_WARM\">\
             <artifact type=\"SPLIT\" location=\"/out/a.apk\"/>\
             </build></instant-run>",
        )
        .unwrap();
        assert!(cmd_artifacts(&path, None).is_ok());
        assert!(cmd_timings(&path).is_ok());
        assert!(cmd_inspect(&path).is_ok());
    }
}
