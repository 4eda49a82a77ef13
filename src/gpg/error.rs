//! Invocation error types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::launcher::SpawnError;

/// Failure conditions recognised on gpg's stderr during streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    /// The supplied passphrase was wrong.
    BadPassphrase,
    /// No secret key is available to decrypt the input.
    NoSecretKey,
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadPassphrase => write!(f, "Bad passphrase"),
            Self::NoSecretKey => write!(f, "No secret key"),
        }
    }
}

/// Errors surfaced by the buffered and streaming invokers.
#[derive(thiserror::Error, Debug)]
pub enum InvokeError {
    /// gpg could not be started.
    #[error("Failed to spawn gpg: {0}")]
    Spawn(#[from] SpawnError),

    /// The streaming request has no source.
    #[error("Missing 'source' option (path or stream)")]
    MissingSource,

    /// The streaming request has no destination.
    #[error("Missing 'dest' option (path or stream)")]
    MissingDest,

    /// The source file could not be opened.
    #[error("{} does not exist. Error: {source}", .path.display())]
    SourceOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The destination file could not be opened.
    #[error("Error opening {}. Error: {source}", .path.display())]
    DestOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// gpg exited with a nonzero status.
    #[error("{message}")]
    ProcessFailure {
        /// Exit code, `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Accumulated stderr text, or stdout text when stderr was empty.
        message: String,
    },

    /// A known failure phrase appeared on stderr.
    #[error("{0}")]
    Rejected(RejectKind),

    /// Copying bytes between a stream and the process failed.
    #[error("Pipe error: {0}")]
    Pipe(#[source] std::io::Error),

    /// Waiting on the process or reading its pipes failed.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Every event source finished without producing a result.
    #[error("Invocation ended without a result")]
    Abandoned,
}

impl InvokeError {
    /// Whether this error comes from request validation, before any spawn.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingSource | Self::MissingDest)
    }

    /// The recognised reject condition, if this is one.
    #[must_use]
    pub fn reject_kind(&self) -> Option<RejectKind> {
        match self {
            Self::Rejected(kind) => Some(*kind),
            _ => None,
        }
    }
}
