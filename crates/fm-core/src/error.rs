//! Unified error type for the ffmigo pipeline.
//!
//! All crates funnel their failures into [`Error`]. Every variant's display
//! string is written to be shown directly to an end user; no failure in the
//! pipeline is swallowed silently.

/// Unified error type covering all failure modes in ffmigo.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A generated command failed the safety policy (and was never
    /// executed), or a request was structurally invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external executable was absent from every search location.
    #[error("{tool} not found: {message}")]
    ToolNotFound {
        /// Name of the missing tool.
        tool: String,
        /// Where we looked and what to do about it.
        message: String,
    },

    /// Media probing failed (tool failure, timeout, or malformed metadata).
    #[error("Probe error: {0}")]
    Probe(String),

    /// A command run failed (non-zero exit, timeout, or spawn failure).
    #[error("Execution error: {0}")]
    Execution(String),

    /// A run reported success but the expected output artifact does not
    /// exist on disk. Always terminal: silent divergence between exit code
    /// and the expected side effect must never be treated as success.
    #[error("Inconsistent result: {0}")]
    Consistency(String),

    /// The bounded retry loop was used up without a successful run.
    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Diagnostics from the final failed attempt.
        last_error: String,
    },

    /// A checkpoint snapshot or its metadata is missing or corrupt.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::ToolNotFound`].
    pub fn tool_not_found(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolNotFound {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(message: impl Into<String>) -> Self {
        Error::Probe(message.into())
    }

    /// Convenience constructor for [`Error::Execution`].
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution(message.into())
    }

    /// Convenience constructor for [`Error::Checkpoint`].
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Error::Checkpoint(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
