//! Unix domain socket transport implementation

use super::Transport;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::net::UnixStream;
use tracing::debug;

/// Unix socket transport configuration
#[derive(Debug, Clone)]
pub struct UnixTransportConfig {
    pub socket_path: PathBuf,
}

/// Unix socket transport implementation
#[derive(Debug)]
pub struct UnixTransport {
    config: UnixTransportConfig,
}

impl UnixTransport {
    /// Create a new Unix socket transport
    pub fn new(config: UnixTransportConfig) -> Self {
        Self { config }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.config.socket_path
    }
}

#[async_trait]
impl Transport for UnixTransport {
    type Stream = UnixStream;

    async fn connect(&self) -> Result<Self::Stream> {
        let stream = UnixStream::connect(&self.config.socket_path).await?;
        debug!(
            "Unix socket connection established to {:?}",
            self.config.socket_path
        );
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "unix"
    }
}
