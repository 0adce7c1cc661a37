//! Pipeline driver: owns the end-to-end control flow of one job.
//!
//! The driver decides whether to partition, sequences conversion, merge and
//! skim, and records every intermediate file it creates in the caller's
//! [`TransientArtifactSet`]. It never deletes those files itself; the
//! surrounding job wrapper owns cleanup.
//!
//! Fatal errors abort the job with no partial-success state. The one
//! deliberate exception to fail-fast sequencing is the skim batch: every
//! declared output is attempted so independent deliverables do not shadow
//! each other, and the first failure is returned after the batch.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::Instrument;

use nanoprod_core::lumi::RunNumber;
use nanoprod_core::{stage_span, JobConfig, OutputDescriptor};

use crate::convert::{convert, ConversionRequest};
use crate::environment::prepare_customisation;
use crate::error::{Error, Result};
use crate::merge::merge;
use crate::partition::{build_partition_index, PartitionIndex, RunLumiSource};
use crate::runner::ToolRunner;
use crate::skim::skim;

/// File name of the singular / merged intermediate artifact.
pub const PRIMARY_ARTIFACT: &str = "cmsRun_out.root";

/// Base name for per-run selector files.
pub const SELECTOR_BASE: &str = "lumi_mask";

/// Base name for generated job descriptions.
const GENERATED_CONFIG_STEM: &str = "nano_NANO";

/// Ordered, deduplicated record of every intermediate file the driver
/// created.
///
/// Grows monotonically during a run; recorded before the file is produced,
/// so the set is complete no matter how the pipeline exits.
#[derive(Debug, Default)]
pub struct TransientArtifactSet {
    paths: Vec<PathBuf>,
    seen: BTreeSet<PathBuf>,
}

impl TransientArtifactSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one path; duplicates are ignored.
    pub fn record(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }

    /// Returns the recorded paths in recording order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Returns true if the given path was recorded.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    /// Returns the number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// Number of conversion stage invocations.
    pub conversions: usize,
    /// True if the merge stage ran.
    pub merged: bool,
}

/// One per-run conversion planned by the driver.
struct Partition {
    selector: PathBuf,
    output: PathBuf,
    generated_config: PathBuf,
    report: PathBuf,
}

/// The pipeline driver.
pub struct Pipeline {
    config: JobConfig,
    runner: Arc<dyn ToolRunner>,
    metadata: Option<Arc<dyn RunLumiSource>>,
}

impl Pipeline {
    /// Creates a driver for the given configuration and tool runner.
    #[must_use]
    pub fn new(config: JobConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            runner,
            metadata: None,
        }
    }

    /// Attaches the partition metadata source.
    ///
    /// Required when the configuration requests per-run processing.
    #[must_use]
    pub fn with_metadata(mut self, source: Arc<dyn RunLumiSource>) -> Self {
        self.metadata = Some(source);
        self
    }

    /// Runs the whole job: partition decision, conversion(s), merge, skims.
    ///
    /// `report` names the status report of the conversion execution phase;
    /// per-run conversions derive `_{run}`-suffixed names from it.
    ///
    /// `transients` is owned by the caller (the job wrapper cleans them up
    /// after stage-out) and is filled in even when the pipeline fails
    /// partway.
    ///
    /// # Errors
    /// Returns the first fatal error. Configuration is validated up front,
    /// before any external engine runs.
    pub async fn run(
        &self,
        input: &Path,
        outputs: &[OutputDescriptor],
        report: &Path,
        transients: &mut TransientArtifactSet,
    ) -> Result<PipelineReport> {
        if outputs.is_empty() {
            return Err(Error::Config(nanoprod_core::Error::configuration(
                "job declares no outputs",
            )));
        }
        self.config.validate().map_err(Error::Config)?;
        nanoprod_core::validate_descriptors(outputs).map_err(Error::Config)?;

        let work_dir = self.config.work_dir.clone();
        let primary = work_dir.join(PRIMARY_ARTIFACT);
        transients.record(&primary);

        if let (Some(hook), Some(base)) = (
            &self.config.customisation_function,
            &self.config.cmssw_base,
        ) {
            prepare_customisation(hook, &self.config.sandbox_dir, base)?;
        }

        let index = self.build_index(input, &work_dir, transients)?;

        let (conversions, merged) = if index.len() > 1 {
            let count = self
                .convert_partitions(input, &index, report, &primary, transients)
                .await?;
            (count, true)
        } else {
            let generated = work_dir.join(format!("{GENERATED_CONFIG_STEM}.py"));
            transients.record(&generated);
            convert(
                self.runner.as_ref(),
                &self.config,
                ConversionRequest {
                    input,
                    output: &primary,
                    report,
                    generated_config: &generated,
                    lumi_mask: None,
                },
            )
            .instrument(stage_span("convert", &input.display().to_string()))
            .await?;
            (1, false)
        };

        self.skim_outputs(&primary, outputs).await?;

        Ok(PipelineReport {
            conversions,
            merged,
        })
    }

    /// Builds the partition index when per-run processing is requested.
    ///
    /// An index with at most one entry degrades the job to unpartitioned
    /// processing; partitioning a single run has no value.
    fn build_index(
        &self,
        input: &Path,
        work_dir: &Path,
        transients: &mut TransientArtifactSet,
    ) -> Result<PartitionIndex> {
        if !self.config.split_by_run {
            return Ok(PartitionIndex::new());
        }
        let source = self.metadata.as_deref().ok_or_else(|| {
            Error::Config(nanoprod_core::Error::configuration(
                "per-run processing requested but no run/lumi metadata source is configured",
            ))
        })?;

        let span = stage_span("partition", &input.display().to_string());
        let _guard = span.enter();
        let index = build_partition_index(source, input, work_dir, SELECTOR_BASE)?;
        for selector in index.values() {
            transients.record(selector);
        }
        if index.len() <= 1 {
            tracing::warn!(
                runs = index.len(),
                "input covers at most one run; processing unpartitioned"
            );
        }
        Ok(index)
    }

    /// Converts every partition (bounded concurrency, ascending run order)
    /// and merges the results into the primary artifact.
    async fn convert_partitions(
        &self,
        input: &Path,
        index: &PartitionIndex,
        report: &Path,
        primary: &Path,
        transients: &mut TransientArtifactSet,
    ) -> Result<usize> {
        let mut partitions = Vec::with_capacity(index.len());
        for (run, selector) in index {
            let partition = Partition {
                selector: selector.clone(),
                output: self
                    .config
                    .work_dir
                    .join(format!("cmsRun_out_{run}.root")),
                generated_config: self
                    .config
                    .work_dir
                    .join(format!("{GENERATED_CONFIG_STEM}_{run}.py")),
                report: per_run_path(report, *run),
            };
            transients.record(&partition.output);
            transients.record(&partition.generated_config);
            transients.record(&partition.report);
            partitions.push(partition);
        }

        tracing::info!(
            partitions = partitions.len(),
            concurrency = self.config.convert_jobs,
            "converting partitions"
        );
        // `buffered` preserves ascending-run result order and drops (and
        // thereby kills) still-pending conversions on the first failure.
        stream::iter(partitions.iter().map(|partition| {
            convert(
                self.runner.as_ref(),
                &self.config,
                ConversionRequest {
                    input,
                    output: &partition.output,
                    report: &partition.report,
                    generated_config: &partition.generated_config,
                    lumi_mask: Some(&partition.selector),
                },
            )
        }))
        .buffered(self.config.convert_jobs)
        .try_collect::<Vec<()>>()
        .await?;

        // The per-partition converts only clear their own outputs; a stale
        // primary from an earlier attempt must not survive a failed merge.
        match tokio::fs::remove_file(primary).await {
            Ok(()) => {
                tracing::debug!(primary = %primary.display(), "removed stale merge output");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let ordered: Vec<PathBuf> = partitions
            .iter()
            .map(|partition| partition.output.clone())
            .collect();
        merge(self.runner.as_ref(), &self.config, primary, &ordered)
            .instrument(stage_span("merge", &primary.display().to_string()))
            .await?;
        Ok(partitions.len())
    }

    /// Runs the skim stage for every declared output.
    ///
    /// Each descriptor is attempted even if an earlier one failed; the
    /// first error is returned once the batch is done.
    async fn skim_outputs(&self, primary: &Path, outputs: &[OutputDescriptor]) -> Result<()> {
        let mut first_error = None;
        for descriptor in outputs {
            let result = skim(self.runner.as_ref(), &self.config, primary, descriptor)
                .instrument(stage_span("skim", &descriptor.file_name))
                .await;
            if let Err(error) = result {
                tracing::error!(
                    output = %descriptor.file_name,
                    %error,
                    "skim failed for output"
                );
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Derives a per-run variant of `path` by suffixing `_{run}` to its stem.
fn per_run_path(path: &Path, run: RunNumber) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("report");
    let name = match path.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{stem}_{run}.{ext}"),
        None => format!("{stem}_{run}"),
    };
    path.with_file_name(name)
}
