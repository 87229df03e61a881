//! Error taxonomy for the migration core.
//!
//! Leaf operations return [`CopyError`] so callers can dispatch on kind
//! (e.g. decide whether a stage is retryable); orchestration-level code
//! just propagates it through `anyhow::Result` with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("out of memory assembling {0}")]
    OutOfMemory(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("child process {program} exited with status {status}")]
    ChildFailure { program: String, status: i32 },

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("transient external failure: {0}")]
    TransientExternal(String),

    #[error("bug: {0}")]
    BugError(String),

    #[error(transparent)]
    Database(#[from] postgres::Error),
}

pub type Result<T> = std::result::Result<T, CopyError>;
