//! # nanoprod-flow
//!
//! Pipeline driver and stages for the nanoprod batch production job.
//!
//! One invocation processes exactly one raw input file:
//!
//! - **Partition Index Builder**: per-run lumi selectors from input metadata
//! - **Conversion Stage**: two-phase external engine invocation per
//!   partition (or once, unpartitioned)
//! - **Merge Stage**: combines per-run artifacts, ascending by run
//! - **Skim Stage**: one filtered (or verbatim) deliverable per declared
//!   output, with a fallback-setup path in update mode
//! - **Pipeline Driver**: sequences the stages and records every transient
//!   artifact for the external cleanup wrapper
//!
//! ## Guarantees
//!
//! - **Deterministic**: partition order, selector names and merge input
//!   order are functions of the input metadata alone
//! - **Fail-fast**: any engine exiting non-zero aborts the job; there is no
//!   partial-success state
//! - **Observable equivalence**: splitting by run is a parallelism
//!   optimization, never a behavior change for a single-run input

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod convert;
pub mod driver;
pub mod environment;
pub mod error;
pub mod merge;
pub mod partition;
pub mod runner;
pub mod skim;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::driver::{Pipeline, PipelineReport, TransientArtifactSet};
    pub use crate::error::{Error, Result};
    pub use crate::partition::{PartitionIndex, RunLumiIndex, RunLumiSource};
    pub use crate::runner::{ProcessRunner, ScriptedRunner, ToolInvocation, ToolRunner};
}

pub use driver::{Pipeline, PipelineReport, TransientArtifactSet};
pub use error::{Error, Result};
pub use partition::{build_partition_index, PartitionIndex, RunLumiIndex, RunLumiSource};
pub use runner::{ProcessRunner, ScriptedRunner, ToolInvocation, ToolRunner};
