//! Error types for host interactions.

/// Errors from the host tools the reclaimer shells out to.
///
/// These never escape [`crate::Reclaimer::reclaim`]; they are logged and
/// swallowed there.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{tool} is not available on this host")]
    ToolUnavailable { tool: String },

    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
