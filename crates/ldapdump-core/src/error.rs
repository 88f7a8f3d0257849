//! Error types for ldapdump operations.
//!
//! Every stage of an invocation reports failures through [`Error`]. Nothing below the binary
//! terminates the process; the caller decides how an error is shown and which exit code it
//! maps to.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Main error type for ldapdump operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Command line input could not be parsed
    #[error("Invalid arguments supplied: {0}")]
    ArgumentParse(String),

    /// The arguments file named on the command line does not exist
    #[error("Arguments file \"{}\" does not exist", .0.display())]
    ConfigFileNotFound(PathBuf),

    /// The arguments file could not be read or decoded
    #[error("Failed to read arguments file \"{}\": {message}", path.display())]
    ConfigFileParse {
        /// Path of the arguments file
        path: PathBuf,
        /// Reader or decoder message
        message: String,
    },

    /// A setting carried a value that cannot be coerced to its type
    #[error("Invalid value for `{key}`: {message}")]
    InvalidValue {
        /// Setting name
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// One or more required settings are absent after merging all sources
    #[error("Required arguments not defined: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    /// The merged configuration failed range or shape validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Connecting to the directory server failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The directory server rejected the bind
    #[error("Bind failed: {0}")]
    Bind(String),

    /// The directory search failed
    #[error("Search failed: {0}")]
    Search(String),

    /// The output document could not be serialized
    #[error("Failed to serialize output: {0}")]
    Serialization(String),

    /// The output document could not be written to its file
    #[error("Unable to write output to file \"{}\": {message}", path.display())]
    OutputWrite {
        /// Target path of the write
        path: PathBuf,
        /// I/O error message
        message: String,
    },
}

/// Specialized result type for ldapdump operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ArgumentParse(_) => "ARGUMENT_PARSE_ERROR",
            Self::ConfigFileNotFound(_) => "CONFIG_FILE_NOT_FOUND",
            Self::ConfigFileParse { .. } => "CONFIG_FILE_PARSE_ERROR",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::MissingRequiredFields(_) => "MISSING_REQUIRED_FIELDS",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Bind(_) => "BIND_ERROR",
            Self::Search(_) => "SEARCH_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::OutputWrite { .. } => "OUTPUT_WRITE_ERROR",
        }
    }

    /// Returns the pipeline stage this error terminates.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::ArgumentParse(_) => Stage::ParsingArgs,
            Self::ConfigFileNotFound(_)
            | Self::ConfigFileParse { .. }
            | Self::InvalidValue { .. }
            | Self::MissingRequiredFields(_)
            | Self::ValidationError(_) => Stage::ResolvingConfig,
            Self::Connection(_) => Stage::Connecting,
            Self::Bind(_) => Stage::Binding,
            Self::Search(_) => Stage::Searching,
            Self::Serialization(_) | Self::OutputWrite { .. } => Stage::WritingOutput,
        }
    }

    /// Returns true if the usage text should be shown alongside this error.
    #[must_use]
    pub const fn shows_usage(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::OutputWrite { .. })
    }

    /// Process exit code for this error.
    ///
    /// - 2: argument or configuration error
    /// - 3: directory error
    /// - 4: output error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.stage() {
            Stage::ParsingArgs | Stage::ResolvingConfig => 2,
            Stage::Connecting | Stage::Binding | Stage::Searching => 3,
            Stage::Projecting | Stage::WritingOutput | Stage::Done => 4,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
