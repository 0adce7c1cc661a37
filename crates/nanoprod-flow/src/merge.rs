//! Merge stage: combines per-run artifacts into one file.
//!
//! Delegates to the external merge utility, which concatenates same-schema
//! nanoAOD files. Input order is ascending by run so the merged byte order
//! is deterministic.

use std::path::{Path, PathBuf};

use nanoprod_core::JobConfig;

use crate::error::{Error, Result};
use crate::runner::{ToolInvocation, ToolRunner};

/// Interpreter used for sandbox helper scripts.
pub const SCRIPT_INTERPRETER: &str = "python3";

/// Merge utility script shipped in the job sandbox.
pub const MERGE_TOOL: &str = "haddnano.py";

/// Merges `inputs` into `output` via the external merge utility.
///
/// # Errors
/// Returns a configuration error for fewer than two inputs (a single
/// artifact needs no merge) and `Subprocess` if the utility exits non-zero.
pub async fn merge(
    runner: &dyn ToolRunner,
    config: &JobConfig,
    output: &Path,
    inputs: &[PathBuf],
) -> Result<()> {
    if inputs.len() < 2 {
        return Err(Error::Config(nanoprod_core::Error::configuration(format!(
            "merge requires at least two inputs, got {}",
            inputs.len()
        ))));
    }

    let tool = config.sandbox_dir.join(MERGE_TOOL);
    let invocation = ToolInvocation::new(SCRIPT_INTERPRETER)
        .arg("-u")
        .arg(tool.display().to_string())
        .arg(output.display().to_string())
        .args(inputs.iter().map(|input| input.display().to_string()))
        .current_dir(&config.work_dir);

    tracing::info!(
        output = %output.display(),
        inputs = inputs.len(),
        "merging per-run artifacts"
    );
    runner.run(&invocation).await
}
