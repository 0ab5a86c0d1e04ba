//! Dialing and the HTTP request executor
//!
//! A [`Client`] is bound to exactly one transport and one base URL for its
//! whole life. It never re-dials: once closed, every operation fails with
//! [`ClientError::Closed`].

use crate::body::{self, RequestBody};
use crate::connector::Connector;
use crate::error::{ClientError, Result};
use crate::transport::{
    AnyTransport, SshAuthConfig, SshTransport, TcpTransport, TcpTransportConfig, UnixTransport,
    UnixTransportConfig,
};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use podwire_core::api::API_PREFIX;
use podwire_core::{Endpoint, PodwireConfig, Scheme};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Base URL of clients talking to a local Unix socket
pub const UNIX_BASE_URL: &str = "http://local-unix-socket/";

/// Base URL of clients talking to a Unix socket through SSH
pub const SSH_BASE_URL: &str = "http://unix-over-ssh/";

const APPLICATION_JSON: &str = "application/json";

type HttpClient = hyper_util::client::legacy::Client<Connector, RequestBody>;

/// Settings used when dialing a client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on dialing, and separately on the SSH handshake
    pub connect_timeout: Duration,
    /// Bound on each executor call; `None` waits forever
    pub request_timeout: Option<Duration>,
    pub ssh: SshAuthConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            ssh: SshAuthConfig::default(),
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &PodwireConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            ssh: SshAuthConfig {
                host_key_algorithms: config.ssh.host_key_algorithms.clone(),
                agent_socket: config.ssh.agent_socket.clone(),
                key_path: config.ssh.key_path.clone(),
            },
        }
    }
}

/// Connected API client
pub struct Client {
    endpoint: Endpoint,
    base_url: Url,
    transport: Arc<AnyTransport>,
    http: RwLock<Option<HttpClient>>,
    request_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.to_string())
            .field("base_url", &self.base_url.as_str())
            .field("transport", &self.transport.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn base_url(endpoint: &Endpoint) -> Result<Url> {
    let text = match endpoint.scheme() {
        Scheme::Tcp => {
            let authority = endpoint.authority().unwrap_or_default();
            let mut path = endpoint.path().to_string();
            if !path.starts_with('/') {
                path.insert(0, '/');
            }
            if !path.ends_with('/') {
                path.push('/');
            }
            format!("http://{}{}", authority, path)
        }
        Scheme::Unix => UNIX_BASE_URL.to_string(),
        Scheme::Ssh => SSH_BASE_URL.to_string(),
    };

    Url::parse(&text).map_err(|e| ClientError::config(format!("invalid base URL {}: {}", text, e)))
}

impl Client {
    /// Dial an endpoint. SSH endpoints are fully connected and authenticated
    /// before this returns; TCP and Unix endpoints connect lazily per request.
    pub async fn connect(endpoint: &Endpoint, options: &ClientOptions) -> Result<Self> {
        let base_url = base_url(endpoint)?;

        let transport = match endpoint.scheme() {
            Scheme::Tcp => {
                let mut config = TcpTransportConfig::new(
                    endpoint.host().unwrap_or_default(),
                    endpoint.port().unwrap_or_default(),
                );
                config.connection_timeout = options.connect_timeout;
                AnyTransport::Tcp(TcpTransport::new(config))
            }
            Scheme::Unix => AnyTransport::Unix(UnixTransport::new(UnixTransportConfig {
                socket_path: PathBuf::from(endpoint.path()),
            })),
            Scheme::Ssh => AnyTransport::Ssh(
                SshTransport::establish(endpoint, &options.ssh, options.connect_timeout).await?,
            ),
        };

        let transport = Arc::new(transport);
        let http = hyper_util::client::legacy::Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(Connector::new(transport.clone()));

        info!(
            "Client ready for {} via {} transport",
            endpoint,
            transport.name()
        );

        Ok(Self {
            endpoint: endpoint.clone(),
            base_url,
            transport,
            http: RwLock::new(Some(http)),
            request_timeout: options.request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Parse an endpoint URL and dial it
    pub async fn connect_url(url: &str, options: &ClientOptions) -> Result<Self> {
        let endpoint: Endpoint = url.parse()?;
        Self::connect(&endpoint, options).await
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drop pooled connections and close the transport. Calling this more
    /// than once is harmless.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let http = self
            .http
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(http);

        self.transport.close().await?;
        info!("Client for {} closed", self.endpoint);
        Ok(())
    }

    /// Resolve a path relative to the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::config(format!("invalid request path {}: {}", path, e)))
    }

    fn http(&self) -> Result<HttpClient> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::Closed)
    }

    /// Apply the configured request timeout to an operation
    pub(crate) async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => operation.await,
        }
    }

    /// Send one request and return the URL it went to with the raw response
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: RequestBody,
    ) -> Result<(String, Response<Incoming>)> {
        let http = self.http()?;
        let url = self.url(path)?;

        let mut request = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .body(body)
            .map_err(|e| ClientError::protocol(format!("invalid request for {}: {}", url, e)))?;
        request.headers_mut().extend(headers);

        debug!("{} {}", method, url);
        let response = http.request(request).await?;
        debug!("{} {} -> {}", method, url, response.status());

        Ok((url.into(), response))
    }

    /// POST a JSON body and decode a JSON response
    pub async fn create<I, O>(&self, path: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let payload = serde_json::to_vec(input)
            .map_err(|e| ClientError::protocol(format!("failed to encode request: {}", e)))?;
        self.create_with(path, APPLICATION_JSON, payload).await
    }

    /// POST a raw body of the given content type and decode a JSON response
    pub async fn create_with<O, B>(&self, path: &str, content_type: &str, payload: B) -> Result<O>
    where
        O: DeserializeOwned,
        B: Into<Bytes>,
    {
        let headers = content_type_header(content_type)?;
        let payload = payload.into();
        self.bounded(async {
            let (url, response) = self
                .send(Method::POST, path, headers, body::full(payload))
                .await?;
            let response = check_status(&url, response).await?;
            decode_json(&url, response).await
        })
        .await
    }

    /// GET and decode a JSON response
    pub async fn get<O: DeserializeOwned>(&self, path: &str) -> Result<O> {
        self.bounded(async {
            let (url, response) = self
                .send(Method::GET, path, HeaderMap::new(), body::empty())
                .await?;
            let response = check_status(&url, response).await?;
            decode_json(&url, response).await
        })
        .await
    }

    /// DELETE, expecting a 2xx status
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.expect_success(Method::DELETE, path, HeaderMap::new(), body::empty())
            .await
    }

    /// POST without a body, expecting a 2xx status
    pub async fn signal(&self, path: &str) -> Result<()> {
        self.expect_success(Method::POST, path, HeaderMap::new(), body::empty())
            .await
    }

    /// PUT a streaming body, expecting a 2xx status
    pub async fn stream(&self, path: &str, content_type: &str, body: RequestBody) -> Result<()> {
        let headers = content_type_header(content_type)?;
        self.expect_success(Method::PUT, path, headers, body).await
    }

    /// Check that the remote API answers
    pub async fn ping(&self) -> Result<()> {
        self.expect_success(
            Method::GET,
            &format!("{}/_ping", API_PREFIX),
            HeaderMap::new(),
            body::empty(),
        )
        .await
    }

    async fn expect_success(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: RequestBody,
    ) -> Result<()> {
        self.bounded(async {
            let (url, response) = self.send(method, path, headers, body).await?;
            let response = check_status(&url, response).await?;
            response.into_body().collect().await?;
            Ok(())
        })
        .await
    }
}

fn content_type_header(content_type: &str) -> Result<HeaderMap> {
    let value = HeaderValue::from_str(content_type)
        .map_err(|e| ClientError::config(format!("invalid content type {}: {}", content_type, e)))?;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, value);
    Ok(headers)
}

/// Turn a non-2xx response into [`ClientError::Status`] carrying the body text
pub(crate) async fn check_status(url: &str, response: Response<Incoming>) -> Result<Response<Incoming>> {
    if response.status().is_success() {
        return Ok(response);
    }

    let code = response.status().as_u16();
    let message = match response.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(e) => format!("failed to read response body: {}", e),
    };

    Err(ClientError::Status {
        code,
        url: url.to_string(),
        message,
    })
}

async fn decode_json<O: DeserializeOwned>(url: &str, response: Response<Incoming>) -> Result<O> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();

    if content_type != APPLICATION_JSON {
        return Err(ClientError::ContentType {
            url: url.to_string(),
            content_type,
        });
    }

    let bytes = response.into_body().collect().await?.to_bytes();
    serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}
