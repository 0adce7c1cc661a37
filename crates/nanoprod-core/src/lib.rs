//! # nanoprod-core
//!
//! Shared primitives for the nanoprod batch production pipeline.
//!
//! This crate provides the foundational types used across all nanoprod
//! components:
//!
//! - **Job Configuration**: Sample type, era and conditions resolution
//! - **Output Descriptors**: Deliverable declarations with skim selections
//! - **Lumi Masks**: Run/lumi types and deterministic selector encoding
//! - **Error Types**: Shared error definitions and result aliases
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `nanoprod-core` holds everything that is decided before the pipeline
//! starts. Stage execution and subprocess plumbing live in `nanoprod-flow`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod lumi;
pub mod observability;
pub mod output;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{Era, JobConfig, SampleType};
    pub use crate::error::{Error, Result};
    pub use crate::lumi::{LumiBlock, LumiMask, LumiRanges, RunNumber};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::output::{OutputDescriptor, SkimConfig, SkimSelection};
}

pub use config::{Era, JobConfig, SampleType};
pub use error::{Error, Result};
pub use lumi::{selector_file_name, LumiBlock, LumiMask, LumiRanges, RunNumber};
pub use observability::{init_logging, stage_span, LogFormat};
pub use output::{validate_descriptors, OutputDescriptor, SkimConfig, SkimSelection};
