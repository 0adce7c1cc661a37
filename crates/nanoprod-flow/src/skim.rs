//! Skim stage: derives one deliverable from the intermediate artifact.
//!
//! Per output descriptor the stage is a small state machine:
//!
//! - **no filter**: the intermediate artifact is copied to the destination
//!   verbatim; terminal.
//! - **primary filter**: the filter engine runs with the declared setup,
//!   instructed to skip writing a file when the result is empty. Terminal
//!   unless a fallback setup is declared.
//! - **fallback filter**: the engine runs again with the fallback setup
//!   against the same source, in update mode, so its rows are appended to
//!   whatever the primary pass produced.
//!
//! The engine exits zero for an empty result, so emptiness is not
//! observable here; a declared fallback therefore always runs, and
//! `--skip-empty` on both passes yields exactly the documented outcome.

use std::path::Path;

use nanoprod_core::{JobConfig, OutputDescriptor, SkimSelection};

use crate::error::Result;
use crate::merge::SCRIPT_INTERPRETER;
use crate::runner::{ToolInvocation, ToolRunner};

/// Filter engine script shipped in the job sandbox.
pub const SKIM_TOOL: &str = "skim_tree.py";

fn filter_invocation(
    config: &JobConfig,
    source: &Path,
    destination: &Path,
    selection: &SkimSelection,
    setup: &str,
    update: bool,
) -> ToolInvocation {
    let tool = config.sandbox_dir.join(SKIM_TOOL);
    let mut invocation = ToolInvocation::new(SCRIPT_INTERPRETER)
        .arg("-u")
        .arg(tool.display().to_string())
        .args(["--input", &source.display().to_string()])
        .args(["--output", &destination.display().to_string()])
        .args(["--config", &selection.config.display().to_string()])
        .args(["--setup", setup])
        .arg("--skip-empty")
        .current_dir(&config.work_dir);
    if update {
        invocation = invocation.arg("--update-output");
    }
    invocation.args(["--verbose", "1"])
}

/// Produces one declared output from the intermediate artifact.
///
/// # Errors
/// Returns `Io` if the verbatim copy fails and `Subprocess` if a filter
/// pass exits non-zero. An empty filter result is not an error.
pub async fn skim(
    runner: &dyn ToolRunner,
    config: &JobConfig,
    source: &Path,
    descriptor: &OutputDescriptor,
) -> Result<()> {
    let destination = descriptor.destination(&config.work_dir);

    let Some(selection) = &descriptor.skim else {
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "no filter declared; copying intermediate artifact"
        );
        tokio::fs::copy(source, &destination).await?;
        return Ok(());
    };

    tracing::info!(
        destination = %destination.display(),
        setup = %selection.setup,
        "running primary filter pass"
    );
    runner
        .run(&filter_invocation(
            config,
            source,
            &destination,
            selection,
            &selection.setup,
            false,
        ))
        .await?;

    if let Some(fallback) = &selection.fallback_setup {
        tracing::info!(
            destination = %destination.display(),
            setup = %fallback,
            "running fallback filter pass in update mode"
        );
        runner
            .run(&filter_invocation(
                config,
                source,
                &destination,
                selection,
                fallback,
                true,
            ))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use nanoprod_core::{Era, SampleType};

    use crate::runner::ScriptedRunner;

    fn config(dir: &Path) -> JobConfig {
        JobConfig {
            sample_type: SampleType::Mc,
            era: Era::Run3_2023,
            max_events: -1,
            customisation_function: None,
            customisation_commands: None,
            split_by_run: false,
            convert_jobs: 1,
            work_dir: dir.to_path_buf(),
            sandbox_dir: dir.to_path_buf(),
            cmssw_base: None,
        }
    }

    #[tokio::test]
    async fn test_skim_without_filter_copies_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let source = dir.path().join("merged.root");
        std::fs::write(&source, b"merged bytes").unwrap();

        let descriptor = OutputDescriptor::parse("nano.root").unwrap();
        skim(&runner, &config(dir.path()), &source, &descriptor)
            .await
            .unwrap();

        assert!(runner.invocations().is_empty());
        assert_eq!(
            std::fs::read(dir.path().join("nano.root")).unwrap(),
            b"merged bytes"
        );
    }

    #[tokio::test]
    async fn test_skim_primary_only() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let descriptor = OutputDescriptor::parse("nano.root;pfn;skim.yaml;loose").unwrap();

        skim(
            &runner,
            &config(dir.path()),
            Path::new("merged.root"),
            &descriptor,
        )
        .await
        .unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        let pass = &invocations[0];
        assert!(pass.args[1].ends_with(SKIM_TOOL));
        assert_eq!(pass.flag_value("--setup"), Some("loose"));
        assert_eq!(pass.flag_value("--config"), Some("skim.yaml"));
        assert!(pass.has_flag("--skip-empty"));
        assert!(!pass.has_flag("--update-output"));
    }

    #[tokio::test]
    async fn test_skim_fallback_appends_to_same_destination() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let descriptor = OutputDescriptor::parse("nano.root;pfn;skim.yaml;loose;backup").unwrap();

        skim(
            &runner,
            &config(dir.path()),
            Path::new("merged.root"),
            &descriptor,
        )
        .await
        .unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);

        let primary = &invocations[0];
        let fallback = &invocations[1];
        assert_eq!(primary.flag_value("--setup"), Some("loose"));
        assert!(!primary.has_flag("--update-output"));
        assert_eq!(fallback.flag_value("--setup"), Some("backup"));
        assert!(fallback.has_flag("--update-output"));
        assert!(fallback.has_flag("--skip-empty"));
        assert_eq!(
            primary.flag_value("--output"),
            fallback.flag_value("--output")
        );
    }

    #[tokio::test]
    async fn test_skim_primary_failure_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.on(SCRIPT_INTERPRETER, |invocation| {
            Err(crate::error::Error::subprocess(
                &invocation.program,
                Some(1),
                "engine crash",
            ))
        });
        let descriptor = OutputDescriptor::parse("nano.root;pfn;skim.yaml;loose;backup").unwrap();

        let result = skim(
            &runner,
            &config(dir.path()),
            Path::new("merged.root"),
            &descriptor,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(runner.invocations().len(), 1);
    }
}
