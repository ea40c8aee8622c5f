//! Error types for cluster collaborators.

use thiserror::Error;

/// Errors raised by the provisioning and remote-execution clients.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The platform CLI binary could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The platform CLI exited with a non-zero status.
    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// A structured document returned by the platform could not be decoded.
    #[error("malformed {document} document: {reason}")]
    MalformedDocument { document: String, reason: String },

    /// A blocking operation exceeded its caller-supplied deadline.
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },
}

/// Result type for collaborator operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
