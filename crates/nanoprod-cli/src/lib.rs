//! # nanoprod-cli
//!
//! Command-line interface for the nanoprod batch production job.
//!
//! One invocation processes exactly one raw input file end to end:
//! partition decision, conversion, merge, and one skim pass per declared
//! output. The binary is meant to be driven by an outer grid wrapper, which
//! reads the transient-artifact lines from stdout and cleans them up after
//! stage-out.
//!
//! ## Configuration
//!
//! Everything is a command-line flag; only the CMSSW installation root also
//! falls back to the environment:
//!
//! - `CMSSW_BASE` - root of the CMSSW installation (for hook staging)
//! - `RUST_LOG` - log-level filter (e.g. `info`, `nanoprod_flow=debug`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use nanoprod_core::{Era, JobConfig, LogFormat, OutputDescriptor, SampleType};
use nanoprod_flow::{Pipeline, ProcessRunner, RunLumiIndex, TransientArtifactSet};

/// nanoprod - batch nanoAOD production job.
#[derive(Debug, Parser)]
#[command(name = "nanoprod")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Raw input file to process.
    #[arg(long)]
    pub input: PathBuf,

    /// Output descriptor line; repeat for multiple outputs.
    ///
    /// Format: `file[;pfn[;skim_cfg;skim_setup[;skim_setup_failed]]]`.
    #[arg(long = "output", required = true)]
    pub outputs: Vec<String>,

    /// Kind of the input sample (`data` or `mc`).
    #[arg(long)]
    pub sample_type: SampleType,

    /// Data-taking era of the input sample (e.g. `Run2_2018`).
    #[arg(long)]
    pub era: Era,

    /// Event-count cap for the conversion engine; -1 processes everything.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub max_events: i64,

    /// Post-processing hook reference (`pkg/subpkg/module.function`).
    #[arg(long)]
    pub customise: Option<String>,

    /// Raw customisation commands passed through to the conversion engine.
    #[arg(long)]
    pub customise_commands: Option<String>,

    /// Process each run of the input separately and merge afterwards.
    #[arg(long, requires = "run_lumi_index")]
    pub split_by_run: bool,

    /// Run/lumi index document mapping dataset files to their runs.
    #[arg(long)]
    pub run_lumi_index: Option<PathBuf>,

    /// Directory where all intermediate artifacts are written.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory holding job-local helper scripts and hook sources.
    #[arg(long, default_value = ".")]
    pub sandbox_dir: PathBuf,

    /// Root of the CMSSW installation, for customisation hook staging.
    #[arg(long, env = "CMSSW_BASE")]
    pub cmssw_base: Option<PathBuf>,

    /// Status report written by the conversion execution phase.
    #[arg(long, default_value = "FrameworkJobReport.xml")]
    pub report: PathBuf,

    /// Maximum number of concurrent per-run conversions.
    #[arg(long, default_value_t = 1)]
    pub convert_jobs: usize,

    /// Log output format (`json` or `pretty`).
    #[arg(long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Builds the job configuration from the parsed arguments.
    #[must_use]
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            sample_type: self.sample_type,
            era: self.era,
            max_events: self.max_events,
            customisation_function: self.customise.clone(),
            customisation_commands: self.customise_commands.clone(),
            split_by_run: self.split_by_run,
            convert_jobs: self.convert_jobs,
            work_dir: self.work_dir.clone(),
            sandbox_dir: self.sandbox_dir.clone(),
            cmssw_base: self.cmssw_base.clone(),
        }
    }
}

/// Runs one production job to completion.
///
/// Every transient artifact the pipeline created is printed to stdout as a
/// `transient <path>` line, even when the job fails partway, so the outer
/// wrapper can always clean up.
///
/// # Errors
/// Returns the first fatal pipeline error.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let outputs = cli
        .outputs
        .iter()
        .map(|line| OutputDescriptor::parse(line))
        .collect::<nanoprod_core::Result<Vec<_>>>()?;

    let mut pipeline = Pipeline::new(cli.job_config(), Arc::new(ProcessRunner));
    if let Some(index_path) = &cli.run_lumi_index {
        let index = RunLumiIndex::load(index_path)?;
        pipeline = pipeline.with_metadata(Arc::new(index));
    }

    let mut transients = TransientArtifactSet::new();
    let result = pipeline
        .run(&cli.input, &outputs, &cli.report, &mut transients)
        .await;

    for path in transients.paths() {
        println!("transient {}", path.display());
    }

    let report = result?;
    tracing::info!(
        conversions = report.conversions,
        merged = report.merged,
        "production job finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_builds_job_config_from_flags() {
        let cli = Cli::parse_from([
            "nanoprod",
            "--input",
            "/store/data/input.root",
            "--output",
            "nano.root;pfn",
            "--output",
            "skimmed.root;pfn2;skim.yaml;loose;backup",
            "--sample-type",
            "data",
            "--era",
            "Run2_2018",
            "--split-by-run",
            "--run-lumi-index",
            "run_lumi.json",
            "--work-dir",
            "/job",
            "--sandbox-dir",
            "/job/sandbox",
            "--convert-jobs",
            "4",
        ]);

        assert_eq!(cli.outputs.len(), 2);
        let config = cli.job_config();
        assert_eq!(config.sample_type, SampleType::Data);
        assert_eq!(config.era, Era::Run2_2018);
        assert_eq!(config.max_events, -1);
        assert!(config.split_by_run);
        assert_eq!(config.convert_jobs, 4);
        assert_eq!(config.work_dir, PathBuf::from("/job"));
    }

    #[test]
    fn test_split_requires_index_document() {
        let result = Cli::try_parse_from([
            "nanoprod",
            "--input",
            "input.root",
            "--output",
            "nano.root",
            "--sample-type",
            "mc",
            "--era",
            "Run3_2022",
            "--split-by-run",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_event_cap_is_accepted() {
        let cli = Cli::parse_from([
            "nanoprod",
            "--input",
            "input.root",
            "--output",
            "nano.root",
            "--sample-type",
            "mc",
            "--era",
            "Run3_2023",
            "--max-events",
            "-1",
        ]);
        assert_eq!(cli.max_events, -1);
    }
}
