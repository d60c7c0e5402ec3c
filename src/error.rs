/// Error types for every stage of the pipeline.
///
/// Failures are contained where they happen: a fetch or write error becomes a
/// failed [`DownloadOutcome`](crate::state::data::DownloadOutcome), an open
/// error becomes a `GaveUp` delivery. Nothing here is meant to abort a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::data::ImageId;

/// Failure of the opaque fetch operation (network, remote, or source folder).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Per-identifier failure reported in a download outcome.
///
/// Errors are flattened to strings so outcomes stay `Clone` and can travel
/// through UI messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("fetch failed for {id}: {reason}")]
    Fetch { id: ImageId, reason: String },

    #[error("could not write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("cancelled")]
    Cancelled,
}

/// Failure of a single decode attempt.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image data is truncated")]
    Truncated,

    #[error("decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Outcome of reconciling one arrival that did not produce an image.
#[derive(Debug, Error)]
pub enum OpenError {
    /// A single attempt failed; more attempts may follow.
    #[error("not readable yet: {0}")]
    Transient(#[source] DecodeError),

    /// The retry budget is spent.
    #[error("gave up on {} after {attempts} attempts: {last}", path.display())]
    Fatal {
        path: PathBuf,
        attempts: u32,
        last: DecodeError,
    },

    #[error("reconciliation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum HousekeepingError {
    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("cannot resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

/// Top-level error for starting the pipeline or launching a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Housekeeping(#[from] HousekeepingError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("could not list identifiers: {0}")]
    Identifiers(#[from] FetchError),

    #[error("pipeline has been shut down")]
    ShutDown,
}
