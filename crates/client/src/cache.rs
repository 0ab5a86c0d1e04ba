//! Cache of connected clients keyed by endpoint URL

use crate::client::{Client, ClientOptions};
use crate::error::{ClientError, Result};
use podwire_core::Endpoint;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Keeps one live [`Client`] per endpoint.
///
/// The lock is held while dialing, so concurrent callers asking for the same
/// endpoint share one connection instead of racing to create two.
pub struct ClientCache {
    default_host: Option<String>,
    options: ClientOptions,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientCache {
    pub fn new(default_host: Option<String>, options: ClientOptions) -> Self {
        Self {
            default_host,
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the endpoint a caller asked for, falling back to the default
    /// host when `host` is empty
    fn resolve<'a>(&'a self, host: &'a str) -> Result<&'a str> {
        if !host.is_empty() {
            return Ok(host);
        }
        self.default_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                ClientError::config(
                    "no container host given and no default host configured \
                     (set default_host or CONTAINER_HOST)",
                )
            })
    }

    /// Return the cached client for `host`, dialing and pinging a new one if
    /// there is none yet
    pub async fn get(&self, host: &str) -> Result<Arc<Client>> {
        let host = self.resolve(host)?;
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(host) {
            if !client.is_closed() {
                debug!("Reusing cached client for {}", client.endpoint());
                return Ok(client.clone());
            }
        }

        let endpoint: Endpoint = host.parse()?;
        let client = Client::connect(&endpoint, &self.options).await?;
        if let Err(e) = client.ping().await {
            warn!("Ping of {} failed, not caching client: {}", endpoint, e);
            let _ = client.close().await;
            return Err(e);
        }

        let client = Arc::new(client);
        clients.insert(host.to_string(), client.clone());
        info!("Cached client for {}", endpoint);
        Ok(client)
    }

    /// Number of cached clients
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Close every cached client and empty the cache. All clients are closed
    /// even if some fail; the first failure is returned.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<_> = self.clients.lock().await.drain().collect();
        let mut first_error = None;

        for (host, client) in drained {
            if let Err(e) = client.close().await {
                warn!("Failed to close client for {}: {}", host, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
