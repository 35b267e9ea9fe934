//! Build job errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::coverage::CoverageError;
use crate::package::PackageError;
use crate::source::SourceError;

/// Errors that abort a build run or a size estimate.
#[derive(Debug, Error)]
pub enum JobError {
    /// A coverage region is malformed
    #[error(transparent)]
    Coverage(#[from] CoverageError),

    /// The registered coverage yields no tiles
    #[error("No tiles are covered by the registered regions")]
    EmptyCoverage,

    /// A tile could not be obtained from its source
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Cache access failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The container could not be written
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Staging or artifact file operation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata record could not be serialized
    #[error("Failed to write metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The run was stopped on request
    #[error("Job cancelled")]
    Cancelled,
}

impl JobError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for cooperative cancellation, which is not reported as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }

    /// The underlying source error, if any.
    pub fn source_error(&self) -> Option<&SourceError> {
        match self {
            JobError::Source(e) => Some(e),
            _ => None,
        }
    }
}
