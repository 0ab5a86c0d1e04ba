//! # Podwire Core Library
//!
//! Pieces shared by the client and the command-line front end that do no
//! network I/O:
//!
//! - **Endpoint**: parsing of `tcp://`, `unix://` and `ssh://` container host
//!   URLs, including the host key trust policy carried in the fragment
//! - **API**: JSON payloads of the libpod REST API
//! - **Configuration**: TOML configuration file
//! - **Logging**: `tracing` subscriber setup

pub mod api;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::PodwireConfig;
pub use endpoint::{Endpoint, HostKeyPolicy, Scheme};
pub use error::{EndpointError, PodwireError, Result};
pub use logging::{LogFormat, LogLevel, LogOutput, LoggerBuilder, LoggingConfig};
