//! SSH transport implementation
//!
//! One authenticated SSH session per client. Every stream handed to the
//! HTTP layer is a fresh `direct-streamlocal@openssh.com` channel to the
//! remote API socket, so many requests can run over one session at once.

use super::host_key::HostKeyVerifier;
use super::tcp::{TcpTransportConfig, connect_tcp};
use super::{SshAuthConfig, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use podwire_core::endpoint::join_host_port;
use podwire_core::{Endpoint, EndpointError, Scheme};
use russh::keys::agent::AgentIdentity;
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::Algorithm;
use russh::keys::{PrivateKeyWithHashAlg, PublicKeyOrCertificate, load_secret_key};
use russh::client::{self, Handle, Msg};
use russh::{ChannelStream, Disconnect, Preferred};
use std::borrow::Cow;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// russh client handler that applies the endpoint's host key policy
pub struct SshClientHandler {
    verifier: Arc<HostKeyVerifier>,
}

impl SshClientHandler {
    pub fn new(verifier: Arc<HostKeyVerifier>) -> Self {
        Self { verifier }
    }
}

impl client::Handler for SshClientHandler {
    type Error = ClientError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKeyOrCertificate,
    ) -> std::result::Result<bool, Self::Error> {
        match server_public_key {
            PublicKeyOrCertificate::PublicKey { key, .. } => self.verifier.verify(key)?,
            PublicKeyOrCertificate::Certificate(cert) => self.verifier.verify_certificate(cert)?,
        }
        Ok(true)
    }
}

/// SSH transport implementation
pub struct SshTransport {
    handle: Handle<SshClientHandler>,
    socket_path: String,
    target: String,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("target", &self.target)
            .field("socket_path", &self.socket_path)
            .finish()
    }
}

/// Build the russh client configuration, narrowing host key algorithms when
/// the caller or the pinned key asks for it
fn client_config(verifier: &HostKeyVerifier, auth: &SshAuthConfig) -> Result<client::Config> {
    let mut preferred = Preferred::default();

    let algorithms = if auth.host_key_algorithms.is_empty() {
        verifier.implied_algorithms()
    } else {
        let parsed = auth
            .host_key_algorithms
            .iter()
            .map(|name| {
                Algorithm::from_str(name).map_err(|e| {
                    ClientError::config(format!("unknown host key algorithm '{}': {}", name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Some(parsed)
    };

    if let Some(algorithms) = algorithms {
        debug!("Requesting host key algorithms: {:?}", algorithms);
        preferred.key = Cow::Owned(algorithms);
    }

    // A CA policy can only be satisfied by a host certificate
    if verifier.wants_certificate() {
        preferred.host_key_certificates = Cow::Owned(preferred.key.to_vec());
    }

    Ok(client::Config {
        preferred,
        ..Default::default()
    })
}

async fn authenticate(
    handle: &mut Handle<SshClientHandler>,
    user: &str,
    password: Option<&str>,
    auth: &SshAuthConfig,
) -> Result<()> {
    if let Some(agent_path) = &auth.agent_socket {
        match AgentClient::connect_uds(agent_path).await {
            Ok(mut agent) => match agent.request_identities().await {
                Ok(identities) => {
                    debug!("SSH agent offers {} identities", identities.len());
                    for identity in identities {
                        let attempt = match identity {
                            AgentIdentity::PublicKey { key, .. } => {
                                handle
                                    .authenticate_publickey_with(user, key, None, &mut agent)
                                    .await
                            }
                            AgentIdentity::Certificate { certificate, .. } => {
                                handle
                                    .authenticate_certificate_with(
                                        user,
                                        certificate,
                                        None,
                                        &mut agent,
                                    )
                                    .await
                            }
                        };
                        if let Ok(result) = attempt {
                            if result.success() {
                                info!("Authenticated via SSH agent");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("Failed to get identities from agent: {e}");
                }
            },
            Err(e) => {
                debug!(
                    "Failed to connect to SSH agent at {}: {e}",
                    agent_path.display()
                );
            }
        }
    }

    if let Some(key_path) = &auth.key_path {
        let key = load_secret_key(key_path, None)?;
        let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
        let result = handle.authenticate_publickey(user, key_with_hash).await?;
        if result.success() {
            info!("Authenticated with key: {}", key_path.display());
            return Ok(());
        }
        debug!("Key {} was not accepted", key_path.display());
    }

    if let Some(password) = password {
        let result = handle.authenticate_password(user, password).await?;
        if result.success() {
            info!("Authenticated with password");
            return Ok(());
        }
        debug!("Password was not accepted");
    }

    Err(ClientError::AuthenticationFailed {
        user: user.to_string(),
    })
}

impl SshTransport {
    /// Dial the SSH server named by an `ssh://` endpoint, verify its host
    /// key and authenticate. `connect_timeout` bounds the TCP dial and,
    /// separately, the SSH handshake.
    pub async fn establish(
        endpoint: &Endpoint,
        auth: &SshAuthConfig,
        connect_timeout: Duration,
    ) -> Result<Self> {
        if endpoint.scheme() != Scheme::Ssh {
            return Err(ClientError::config(format!(
                "SSH transport cannot dial a {} endpoint",
                endpoint.scheme()
            )));
        }

        let user = endpoint
            .username()
            .filter(|u| !u.is_empty())
            .ok_or(EndpointError::MissingUsername)?;
        let host = endpoint.host().ok_or_else(|| EndpointError::MissingHost {
            url: endpoint.to_string(),
        })?;
        let port = endpoint.port().unwrap_or(podwire_core::endpoint::DEFAULT_SSH_PORT);
        let policy = endpoint
            .host_key_policy()
            .ok_or(EndpointError::MissingHostKeyPolicy)?;

        // Everything that can be checked offline is checked before dialing
        let verifier = Arc::new(HostKeyVerifier::new(policy, host)?);
        let config = Arc::new(client_config(&verifier, auth)?);

        let target = format!("{}@{}", user, join_host_port(host, port));
        info!("Connecting to SSH server {} ({} policy)", target, policy.name());

        let mut tcp_config = TcpTransportConfig::new(host, port);
        tcp_config.connection_timeout = connect_timeout;
        let stream = connect_tcp(&tcp_config).await?;

        let handler = SshClientHandler::new(verifier.clone());
        let handshake = async {
            let mut handle = client::connect_stream(config, stream, handler).await?;
            authenticate(&mut handle, user, endpoint.password(), auth).await?;
            Ok::<_, ClientError>(handle)
        };

        let handle = match timeout(connect_timeout, handshake).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return Err(verifier.take_rejection().unwrap_or(err)),
            Err(_) => {
                return Err(verifier
                    .take_rejection()
                    .unwrap_or(ClientError::Timeout(connect_timeout)));
            }
        };

        info!("SSH session established to {}", target);

        Ok(Self {
            handle,
            socket_path: endpoint.path().to_string(),
            target,
        })
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }
}

#[async_trait]
impl Transport for SshTransport {
    type Stream = Pin<Box<ChannelStream<Msg>>>;

    async fn connect(&self) -> Result<Self::Stream> {
        let channel = self
            .handle
            .channel_open_direct_streamlocal(self.socket_path.as_str())
            .await?;
        debug!(
            "Opened direct-streamlocal channel to {} via {}",
            self.socket_path, self.target
        );
        Ok(Box::pin(channel.into_stream()))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("SSH disconnect from {} failed: {}", self.target, e);
        }
        info!("SSH session to {} closed", self.target);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}
