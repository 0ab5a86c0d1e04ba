//! Error types for podwire-core

use thiserror::Error;

/// Result type alias for podwire-core operations
pub type Result<T> = std::result::Result<T, PodwireError>;

/// Central error type for podwire-core operations
#[derive(Error, Debug)]
pub enum PodwireError {
    /// Endpoint URL could not be turned into a dialable target
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Endpoint validation errors.
///
/// All of these are raised while parsing, before any network I/O happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The string is not a URL at all
    #[error("invalid container host URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme other than tcp, unix or ssh
    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// A tcp or ssh URL without a host
    #[error("container host URL '{url}' has no host")]
    MissingHost { url: String },

    /// A unix or ssh URL without a socket path
    #[error("container host URL '{url}' has no socket path")]
    MissingSocketPath { url: String },

    /// SSH needs a login name
    #[error("username is required when using SSH transport")]
    MissingUsername,

    /// No usable host-key trust policy in the fragment of an ssh URL
    #[error("ssh container_host URL must end with #ca=... or #pubkey=... or #trust_unknown_host=1")]
    MissingHostKeyPolicy,

    /// More than one trust policy in the fragment of an ssh URL
    #[error("ssh container_host URL must name exactly one host key policy, found: {found}")]
    AmbiguousHostKeyPolicy { found: String },

    /// Trust policy key material could not be parsed
    #[error("invalid {parameter} key in container host URL: {reason}")]
    InvalidHostKey { parameter: String, reason: String },
}

impl PodwireError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for PodwireError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PodwireError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for PodwireError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization(format!("TOML serialization error: {err}"))
    }
}
