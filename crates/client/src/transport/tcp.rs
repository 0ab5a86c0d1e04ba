//! TCP transport implementation
//!
//! Connects directly to a remote API listening on a TCP port. The SSH
//! transport reuses [`connect_tcp`] for its underlying connection.

use super::Transport;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use podwire_core::endpoint::join_host_port;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// TCP transport configuration
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub host: String,
    pub port: u16,
    pub connection_timeout: Duration,
    pub keepalive: bool,
}

impl TcpTransportConfig {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connection_timeout: Duration::from_secs(30),
            keepalive: true,
        }
    }
}

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    /// Create a new TCP transport
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }
}

/// Resolve `host:port` and connect to the first address that answers
pub async fn connect_tcp(config: &TcpTransportConfig) -> Result<TcpStream> {
    let addr = join_host_port(&config.host, config.port);
    debug!("Connecting to TCP server at {}", addr);

    let socket_addrs: Vec<SocketAddr> = lookup_host(&addr).await?.collect();

    if socket_addrs.is_empty() {
        return Err(ClientError::transport(format!(
            "No addresses resolved for: {}",
            addr
        )));
    }

    debug!("Resolved addresses: {:?}", socket_addrs);

    // Try connecting to each resolved address
    let mut last_error = None;
    for socket_addr in socket_addrs {
        match timeout(config.connection_timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                debug!("Connected to {}", socket_addr);

                if config.keepalive {
                    let socket = socket2::Socket::from(stream.into_std()?);
                    socket.set_keepalive(true)?;
                    let stream = TcpStream::from_std(socket.into())?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }

                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                warn!("Failed to connect to {}: {}", socket_addr, e);
                last_error = Some(ClientError::Io(e));
            }
            Err(_) => {
                warn!(
                    "Connection timeout after {:?} to {}",
                    config.connection_timeout, socket_addr
                );
                last_error = Some(ClientError::Timeout(config.connection_timeout));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ClientError::transport(format!(
            "Failed to connect to any resolved address for {}",
            addr
        ))
    }))
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<Self::Stream> {
        let stream = connect_tcp(&self.config).await?;
        info!(
            "TCP connection established to {}:{}",
            self.config.host, self.config.port
        );
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}
