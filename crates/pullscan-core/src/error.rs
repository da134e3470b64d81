//! Error types for the pullscan analysis pipeline.
//!
//! Each component owns a narrow error enum; [`AnalyzeError`] folds them
//! together for the request handler.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ScanPhase;

/// Errors raised while unpacking an encoded archive.
#[derive(Error, Debug)]
pub enum UnpackError {
    /// The payload is not valid base64.
    #[error("archive is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The decoded payload is not a readable gzip stream.
    #[error("archive is not a valid gzip stream: {0}")]
    Decompression(String),

    /// The decompressed stream is not a well-formed tar archive.
    #[error("archive is corrupt: {0}")]
    ArchiveFormat(String),

    /// An entry name would resolve outside the destination directory.
    #[error("archive contained invalid name {name:?}")]
    PathTraversal {
        /// The entry name as declared in the archive.
        name: String,
    },

    /// The archive exceeds the configured entry or size budget.
    #[error("archive exceeds {limit} limit of {max}")]
    LimitExceeded {
        /// Which budget was exhausted ("entry count" or "unpacked size").
        limit: &'static str,
        /// The configured maximum.
        max: u64,
    },

    /// Writing to the destination tree failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl UnpackError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while allocating a request workspace.
#[derive(Error, Debug)]
#[error("workspace setup failed at {}: {source}", path.display())]
pub struct WorkspaceError {
    /// Path that could not be created or written.
    pub path: PathBuf,
    /// Underlying IO error.
    #[source]
    pub source: std::io::Error,
}

/// Errors raised by a [`crate::runner::ProcessRunner`].
#[derive(Error, Debug)]
pub enum RunError {
    /// The program could not be started at all.
    #[error("could not start `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran longer than allowed and was killed.
    #[error("`{program}` timed out after {}s", after.as_secs())]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Configured limit.
        after: Duration,
    },
}

/// Errors raised by the scan orchestrator.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The baseline pass failed for a reason other than findings.
    #[error("baseline failed: {reason}")]
    Baseline {
        /// Short description (exit status or start failure).
        reason: String,
        /// Combined stdout and stderr of the scanner, for server-side logs.
        output: String,
    },

    /// The head pass exited with something other than 0 or 1, or never ran.
    #[error("head scan failed: {reason}")]
    Head {
        /// Short description naming the exit code or start failure.
        reason: String,
        /// Exit code, when the process ran to completion.
        exit_code: Option<i32>,
        /// Scanner stderr, for server-side logs.
        output: String,
    },

    /// A scanner invocation exceeded its time budget.
    #[error("{phase} scan timed out after {}s", after.as_secs())]
    Timeout {
        /// Phase that was running.
        phase: ScanPhase,
        /// Configured limit.
        after: Duration,
    },
}

impl ScanError {
    /// Diagnostic tool output captured with the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Baseline { output, .. } | Self::Head { output, .. } if !output.is_empty() => {
                Some(output)
            }
            _ => None,
        }
    }
}

/// Errors from the end-to-end analysis of one request.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    /// The request itself is unusable.
    #[error("{0}")]
    Validation(String),

    /// The per-request workspace could not be set up.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The base or head archive was rejected.
    #[error("{phase} archive: {source}")]
    Unpack {
        /// Which tree the archive belonged to.
        phase: ScanPhase,
        /// Underlying unpack failure.
        #[source]
        source: UnpackError,
    },

    /// A scanner pass failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A blocking unpack task panicked or was cancelled.
    #[error("unpack task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AnalyzeError {
    /// Returns true if the caller can fix the failure by changing the request.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Unpack { source, .. } => !matches!(source, UnpackError::Io { .. }),
            _ => false,
        }
    }
}
