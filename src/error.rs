use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::freq_table::FreqTable;

/// Result type for a whole counting run
pub type Result<T> = std::result::Result<T, RunError>;

/// A single line could not be turned into an identifier.
///
/// Always recoverable: the line is skipped and counting continues.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing field \"{0}\"")]
    MissingField(String),

    #[error("field \"{0}\" is not a string")]
    WrongType(String),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that end one counting worker
#[derive(Error, Debug)]
pub enum CountError {
    #[error("can't read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt compressed stream in {}: {source}", .path.display())]
    Decompression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker for {} terminated abnormally: {reason}", .path.display())]
    WorkerFailure { path: PathBuf, reason: String },

    #[error("worker for {} was cancelled", .path.display())]
    Cancelled { path: PathBuf },
}

impl CountError {
    pub fn path(&self) -> &PathBuf {
        match self {
            CountError::Io { path, .. }
            | CountError::Decompression { path, .. }
            | CountError::WorkerFailure { path, .. }
            | CountError::Cancelled { path } => path,
        }
    }
}

/// Errors that fail a whole run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("can't list input directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// First fatal worker error under the fail-fast policy
    #[error(transparent)]
    Worker(CountError),

    /// Every fatal worker error under the wait-all policy, together with
    /// the merged counts of the workers that completed.
    #[error("{} of {files} files failed, first: {}", .failures.len(), first_failure(.failures))]
    Failed {
        files: usize,
        failures: Vec<CountError>,
        partial: FreqTable,
    },

    #[error("can't start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

fn first_failure(failures: &[CountError]) -> String {
    failures
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}
