//! Bridges a [`Transport`](crate::transport::Transport) into the hyper
//! connection pool.
//!
//! The request URI is ignored: every connection goes wherever the client's
//! transport dials, which is how Unix and SSH endpoints work with placeholder
//! base URLs.

use crate::error::ClientError;
use crate::transport::{AnyTransport, TransportStream};
use http::Uri;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Connector {
    transport: Arc<AnyTransport>,
}

impl Connector {
    pub fn new(transport: Arc<AnyTransport>) -> Self {
        Self { transport }
    }
}

impl tower_service::Service<Uri> for Connector {
    type Response = TokioIo<TransportStream>;
    type Error = ClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let transport = self.transport.clone();
        Box::pin(async move {
            trace!("Opening {} connection for {}", transport.name(), uri);
            let stream = transport.connect().await?;
            Ok(TokioIo::new(stream))
        })
    }
}
