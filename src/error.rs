//! Error kinds for the storage client.
//!
//! Every fallible operation in this crate returns `anyhow::Result`, but the
//! Backend Gateway, Block Store and pipelines all raise `CasstorError`
//! specifically so that callers (and the CLI) can classify a failure into
//! one of the kinds from the error model: fatal, retryable, or a bad
//! invocation that warrants a distinct exit code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CasstorError {
    /// Connection or quorum failure. Fatal to the current operation.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single request timed out or was rate-limited. Safe to retry:
    /// `put` is idempotent, so at-most-once insert never corrupts state.
    #[error("backend request failed (transient): {0}")]
    BackendTransient(String),

    /// A manifest entry names a hash with no corresponding row in the
    /// block store.
    #[error("missing block at offset {offset}: hash {hash}")]
    MissingBlock { offset: u64, hash: String },

    /// Defensive: the content fetched for a hash does not hash back to it.
    #[error("hash mismatch at offset {offset}: expected {expected}, got {actual}")]
    HashMismatch {
        offset: u64,
        expected: String,
        actual: String,
    },

    /// Source or destination file I/O failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Unrecognized verb or missing argument.
    #[error("bad invocation: {0}")]
    BadInvocation(String),
}

impl CasstorError {
    /// Exit code the CLI should use if this error escapes to `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            CasstorError::BadInvocation(_) => 2,
            _ => 1,
        }
    }

    /// Whether a caller may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CasstorError::BackendTransient(_))
    }
}
