//! Error types for the pipeline domain.

use std::path::PathBuf;

/// The result type used throughout nanoprod-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the pipeline.
///
/// Every variant is fatal for the job: the driver neither retries nor
/// recovers partially.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The job description is invalid (parsed or validated in core).
    #[error(transparent)]
    Config(#[from] nanoprod_core::Error),

    /// Partition metadata could not be extracted for the input file.
    #[error("cannot read partition metadata for {}: {reason}", path.display())]
    MetadataRead {
        /// The input file whose metadata was requested.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An external engine invocation exited non-zero.
    #[error("{program} exited with {}{}", status.map_or_else(|| "signal".to_string(), |code| format!("status {code}")), format_stderr(stderr))]
    Subprocess {
        /// The program that failed.
        program: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Tail of the captured standard error.
        stderr: String,
    },

    /// An IO operation on an intermediate artifact failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl Error {
    /// Creates a metadata read error for the given input.
    #[must_use]
    pub fn metadata_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MetadataRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a subprocess failure for the given program.
    #[must_use]
    pub fn subprocess(
        program: impl Into<String>,
        status: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Subprocess {
            program: program.into(),
            status,
            stderr: stderr.into(),
        }
    }
}
