//! Error taxonomy for the conversion pipeline.
//!
//! Every variant returned through [`Result`] is fatal for the session: the
//! pipeline stops and promotion does not run. Best-effort steps (permission
//! changes, stray-file deletion) never return these; they log and record a
//! warning instead.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use bids_model::ModelError;

/// Errors that halt a pipeline run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Required configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The data violates a rule the pipeline cannot repair.
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    /// An external collaborator (converter, scorer, archive) reported failure.
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// A filesystem operation the pipeline depends on failed.
    #[error("failed to {operation} {path}: {source}")]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Data problems that make promotion unsafe.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    #[error("unrecognized scanner manufacturer '{manufacturer}'")]
    UnrecognizedManufacturer { manufacturer: String },

    #[error("no readable DICOM with scanner tags under {path}")]
    MissingScannerTags { path: PathBuf },

    #[error("run ordering did not converge after {attempts} attempts: {reason}")]
    OrderingNotConverged { attempts: u32, reason: String },

    #[error("diffusion run {run} has a {present} file but no {missing} file")]
    IncompleteGradientTable {
        run: PathBuf,
        present: &'static str,
        missing: &'static str,
    },

    #[error("malformed sidecar {path}: {source}")]
    MalformedSidecar {
        path: PathBuf,
        #[source]
        source: SidecarError,
    },
}

/// Why a sidecar could not be read as a JSON object.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("document is empty")]
    Empty,

    #[error("top-level value is not an object")]
    NotAnObject,

    #[error("content is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used for reporting and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    DataIntegrity,
    ExternalTool,
    Filesystem,
}

impl ErrorCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::DataIntegrity => "data integrity",
            Self::ExternalTool => "external tool",
            Self::Filesystem => "filesystem",
        }
    }
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::DataIntegrity(_) => ErrorCategory::DataIntegrity,
            Self::ExternalTool { .. } => ErrorCategory::ExternalTool,
            Self::Filesystem { .. } => ErrorCategory::Filesystem,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Builds a `map_err` adapter for a sidecar at `path` that cannot be parsed.
    pub fn malformed_sidecar(path: &Path) -> impl FnOnce(SidecarError) -> Self + '_ {
        move |source| {
            Self::DataIntegrity(DataIntegrityError::MalformedSidecar {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Builds a `map_err` adapter for an I/O failure on `path`.
    pub fn fs<'a>(operation: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Filesystem {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
