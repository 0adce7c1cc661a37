//! Error types and result aliases shared across nanoprod components.
//!
//! Configuration problems are surfaced before any external engine runs, so
//! every variant here describes something that is wrong with the job
//! description itself rather than with an execution.

use std::fmt;

/// The result type used throughout nanoprod-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or validating a job description.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The job configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what made the configuration invalid.
        message: String,
    },

    /// An output descriptor line could not be parsed.
    #[error("invalid output descriptor {line:?}: {reason}")]
    InvalidDescriptor {
        /// The raw descriptor line.
        line: String,
        /// Description of the violation.
        reason: String,
    },

    /// A declared skim setup is absent from its configuration document.
    #[error("skim setup {setup:?} not found in {document}")]
    SetupNotFound {
        /// The setup name that was looked up.
        setup: String,
        /// Path of the document that was searched.
        document: String,
    },

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An IO operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new configuration error with the given message.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new descriptor error for the given line.
    #[must_use]
    pub fn invalid_descriptor(line: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidDescriptor {
            line: line.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }
}
