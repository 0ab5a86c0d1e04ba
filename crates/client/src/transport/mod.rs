//! Transport abstraction for the podwire client
//!
//! A transport knows how to open one fresh byte stream to the remote API
//! socket. The HTTP layer calls [`Transport::connect`] once per pooled
//! connection, so a transport must tolerate concurrent use.

use crate::error::Result;
use async_trait::async_trait;
use hyper_util::client::legacy::connect::{Connected, Connection};
use russh::ChannelStream;
use russh::client::Msg;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

pub mod host_key;
pub mod ssh;
pub mod tcp;
pub mod unix;

pub use host_key::HostKeyVerifier;
pub use ssh::{SshClientHandler, SshTransport};
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use unix::{UnixTransport, UnixTransportConfig};

/// Trait for transport implementations
#[async_trait]
pub trait Transport: Send + Sync {
    /// The stream type that implements AsyncRead + AsyncWrite
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new bidirectional stream to the API socket
    async fn connect(&self) -> Result<Self::Stream>;

    /// Release whatever the transport holds open. Streams already handed out
    /// may stop working afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this transport type
    fn name(&self) -> &'static str;
}

/// SSH authentication settings that do not come from the endpoint URL
#[derive(Debug, Clone, Default)]
pub struct SshAuthConfig {
    /// Host key algorithm names to request, in preference order
    pub host_key_algorithms: Vec<String>,
    /// SSH agent socket; every identity it offers is tried
    pub agent_socket: Option<PathBuf>,
    /// Private key file tried after the agent
    pub key_path: Option<PathBuf>,
}

/// Enum that can hold any transport type
#[derive(Debug)]
pub enum AnyTransport {
    Tcp(TcpTransport),
    Unix(UnixTransport),
    Ssh(SshTransport),
}

impl AnyTransport {
    /// Open a new stream on the underlying transport
    pub async fn connect(&self) -> Result<TransportStream> {
        match self {
            AnyTransport::Tcp(t) => t.connect().await.map(TransportStream::Tcp),
            AnyTransport::Unix(t) => t.connect().await.map(TransportStream::Unix),
            AnyTransport::Ssh(t) => t.connect().await.map(TransportStream::Ssh),
        }
    }

    pub async fn close(&self) -> Result<()> {
        match self {
            AnyTransport::Tcp(t) => t.close().await,
            AnyTransport::Unix(t) => t.close().await,
            AnyTransport::Ssh(t) => t.close().await,
        }
    }

    /// Get the name of the transport
    pub fn name(&self) -> &'static str {
        match self {
            AnyTransport::Tcp(t) => t.name(),
            AnyTransport::Unix(t) => t.name(),
            AnyTransport::Ssh(t) => t.name(),
        }
    }
}

/// One connection produced by [`AnyTransport::connect`]
pub enum TransportStream {
    Tcp(TcpStream),
    Unix(UnixStream),
    Ssh(Pin<Box<ChannelStream<Msg>>>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Ssh(s) => s.as_mut().poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Ssh(s) => s.as_mut().poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Unix(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Ssh(s) => s.as_mut().poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Ssh(s) => s.as_mut().poll_shutdown(cx),
        }
    }
}

impl Connection for TransportStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}
