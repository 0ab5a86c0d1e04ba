//! Error types for the podwire client

use podwire_core::{EndpointError, PodwireError};
use std::time::Duration;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error types for the client
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The endpoint URL was rejected before any I/O
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dialing or handshake failure that is not an I/O error
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    /// The server offered a key other than the pinned one
    #[error("ssh host key mismatch: expected {expected}, got {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    /// The server's key failed certificate authority checks
    #[error("ssh host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("SSH authentication failed for user {user}")]
    AuthenticationFailed { user: String },

    /// The server answered outside 200-299
    #[error("{url}: server returned status code {code}: {message}")]
    Status {
        code: u16,
        url: String,
        message: String,
    },

    #[error("{url}: expected application/json response, got {content_type}")]
    ContentType { url: String, content_type: String },

    #[error("{url}: failed to decode response: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed or incomplete exchange
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote reported a failed image pull
    #[error("image pull failed: {0}")]
    PullFailed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("client is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper_util::client::legacy::Error),

    #[error("HTTP body error: {0}")]
    Body(#[from] hyper::Error),

    /// The archive builder callback failed
    #[error("failed to build archive: {source}")]
    Archive {
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// HTTP status code of a [`ClientError::Status`] error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_status(&self, code: u16) -> bool {
        self.status() == Some(code)
    }

    pub fn is_not_found(&self) -> bool {
        self.is_status(404)
    }
}

impl From<std::convert::Infallible> for ClientError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<PodwireError> for ClientError {
    fn from(err: PodwireError) -> Self {
        match err {
            PodwireError::Endpoint(e) => Self::Endpoint(e),
            PodwireError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}
