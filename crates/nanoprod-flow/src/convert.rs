//! Conversion stage: raw input file to structured nanoAOD artifact.
//!
//! The conversion engine is driven in two phases: a configuration-generation
//! step that writes an executable job description, then an execution step
//! that runs it and leaves a machine-readable status report. Either phase
//! exiting non-zero is fatal for the job; the caller interprets the report
//! for diagnostics.

use std::path::Path;

use nanoprod_core::JobConfig;

use crate::error::Result;
use crate::runner::{ToolInvocation, ToolRunner};

/// Configuration-generation program of the conversion engine.
pub const CONFIG_GENERATOR: &str = "cmsDriver.py";

/// Execution program of the conversion engine.
pub const EXECUTOR: &str = "cmsRun";

/// One conversion stage invocation.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    /// Raw input file.
    pub input: &'a Path,
    /// Structured artifact to produce.
    pub output: &'a Path,
    /// Machine-readable status report written by the execution phase.
    pub report: &'a Path,
    /// Executable job description written by the generation phase.
    pub generated_config: &'a Path,
    /// Optional selector restricting processing to a subset of lumi blocks.
    pub lumi_mask: Option<&'a Path>,
}

/// Runs one conversion: generate the job description, then execute it.
///
/// Any pre-existing file at the output path is removed first, so a stale
/// artifact can never be mistaken for this invocation's result.
///
/// # Errors
/// Returns `Subprocess` if either engine phase exits non-zero, `Io` on
/// filesystem failures.
pub async fn convert(
    runner: &dyn ToolRunner,
    config: &JobConfig,
    request: ConversionRequest<'_>,
) -> Result<()> {
    match tokio::fs::remove_file(request.output).await {
        Ok(()) => {
            tracing::debug!(output = %request.output.display(), "removed stale output");
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let mut generate = ToolInvocation::new(CONFIG_GENERATOR)
        .arg("nano")
        .args(["--filein", &request.input.display().to_string()])
        .arg("--fileout")
        .arg(format!("file:{}", request.output.display()))
        .args(["--eventcontent", "NANOAODSIM"])
        .args(["--datatier", "NANOAODSIM"])
        .args(["--step", "NANO"])
        .args(["--nThreads", "1"])
        .arg(config.sample_type.engine_flag())
        .args(["--conditions", config.conditions()?])
        .args(["--era", &config.era.engine_argument()])
        .args(["-n", &config.max_events.to_string()])
        .arg("--python_filename")
        .arg(request.generated_config.display().to_string())
        .arg("--no_exec")
        .current_dir(&config.work_dir);

    if let Some(mask) = request.lumi_mask {
        generate = generate.args(["--lumiToProcess", &mask.display().to_string()]);
    }
    if let Some(function) = &config.customisation_function {
        tracing::info!(function, "using customisation function");
        generate = generate.args(["--customise", function]);
    }
    if let Some(commands) = &config.customisation_commands {
        generate = generate.args(["--customise_commands", commands]);
    }

    runner.run(&generate).await?;

    let execute = ToolInvocation::new(EXECUTOR)
        .args(["-j", &request.report.display().to_string()])
        .arg(request.generated_config.display().to_string())
        .current_dir(&config.work_dir);
    runner.run(&execute).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use nanoprod_core::{Era, SampleType};

    use crate::runner::ScriptedRunner;

    fn config(dir: &Path) -> JobConfig {
        JobConfig {
            sample_type: SampleType::Data,
            era: Era::Run2_2018,
            max_events: 1000,
            customisation_function: None,
            customisation_commands: None,
            split_by_run: false,
            convert_jobs: 1,
            work_dir: dir.to_path_buf(),
            sandbox_dir: dir.to_path_buf(),
            cmssw_base: None,
        }
    }

    fn request<'a>(
        input: &'a Path,
        output: &'a Path,
        report: &'a Path,
        generated: &'a Path,
        mask: Option<&'a Path>,
    ) -> ConversionRequest<'a> {
        ConversionRequest {
            input,
            output,
            report,
            generated_config: generated,
            lumi_mask: mask,
        }
    }

    #[tokio::test]
    async fn test_convert_runs_generate_then_execute() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let output = dir.path().join("out.root");
        let generated = dir.path().join("cfg.py");
        let report = dir.path().join("report.xml");

        convert(
            &runner,
            &config(dir.path()),
            request(Path::new("in.root"), &output, &report, &generated, None),
        )
        .await
        .unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);

        let generate = &invocations[0];
        assert_eq!(generate.program, CONFIG_GENERATOR);
        assert_eq!(generate.args[0], "nano");
        assert_eq!(generate.flag_value("--filein"), Some("in.root"));
        assert_eq!(
            generate.flag_value("--fileout").unwrap(),
            format!("file:{}", output.display())
        );
        assert_eq!(generate.flag_value("--conditions"), Some("auto:run2_data"));
        assert_eq!(
            generate.flag_value("--era"),
            Some("Run2_2018,run2_nanoAOD_106Xv2")
        );
        assert_eq!(generate.flag_value("-n"), Some("1000"));
        assert!(generate.has_flag("--data"));
        assert!(generate.has_flag("--no_exec"));
        assert!(!generate.has_flag("--lumiToProcess"));

        let execute = &invocations[1];
        assert_eq!(execute.program, EXECUTOR);
        assert_eq!(
            execute.flag_value("-j").unwrap(),
            report.display().to_string()
        );
        assert_eq!(
            execute.args.last().unwrap(),
            &generated.display().to_string()
        );
    }

    #[tokio::test]
    async fn test_convert_passes_selector_and_customisation() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let mut job = config(dir.path());
        job.customisation_function = Some("Pkg/Sub/Module.customise".to_string());
        job.customisation_commands = Some("process.maxEvents=1".to_string());
        let output = dir.path().join("out.root");
        let generated = dir.path().join("cfg.py");
        let report = dir.path().join("report.xml");
        let mask = PathBuf::from("lumi_mask_100.json");

        convert(
            &runner,
            &job,
            request(
                Path::new("in.root"),
                &output,
                &report,
                &generated,
                Some(&mask),
            ),
        )
        .await
        .unwrap();

        let generate = &runner.invocations()[0];
        assert_eq!(
            generate.flag_value("--lumiToProcess"),
            Some("lumi_mask_100.json")
        );
        assert_eq!(
            generate.flag_value("--customise"),
            Some("Pkg/Sub/Module.customise")
        );
        assert_eq!(
            generate.flag_value("--customise_commands"),
            Some("process.maxEvents=1")
        );
    }

    #[tokio::test]
    async fn test_convert_removes_stale_output_first() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let output = dir.path().join("out.root");
        std::fs::write(&output, "stale").unwrap();

        convert(
            &runner,
            &config(dir.path()),
            request(
                Path::new("in.root"),
                &output,
                &dir.path().join("report.xml"),
                &dir.path().join("cfg.py"),
                None,
            ),
        )
        .await
        .unwrap();

        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_convert_fails_fast_on_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.on(CONFIG_GENERATOR, |invocation| {
            Err(crate::error::Error::subprocess(
                &invocation.program,
                Some(1),
                "bad args",
            ))
        });

        let result = convert(
            &runner,
            &config(dir.path()),
            request(
                Path::new("in.root"),
                &dir.path().join("out.root"),
                &dir.path().join("report.xml"),
                &dir.path().join("cfg.py"),
                None,
            ),
        )
        .await;

        assert!(result.is_err());
        // The execution phase never ran.
        assert!(runner.invocations_of(EXECUTOR).is_empty());
    }
}
