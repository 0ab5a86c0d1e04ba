#![allow(dead_code)]

pub(crate) mod api_server;
pub(crate) mod ssh_server;

use api_server::FakePodman;
use podwire_client::{Client, ClientOptions};
use russh::keys::ssh_key::{Certificate, PrivateKey, PublicKey};
use ssh_server::{SshServer, SshServerOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Socket path served by the test SSH server
pub const REMOTE_SOCKET: &str = "/run/podman/podman.sock";

pub const SSH_USER: &str = "core";
pub const SSH_PASSWORD: &str = "hunter2";

/// Install a test-friendly tracing subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("podwire_client=debug")
        .try_init();
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

pub fn private_key(name: &str) -> PrivateKey {
    PrivateKey::from_openssh(fixture(name)).unwrap()
}

pub fn public_key(name: &str) -> PublicKey {
    PublicKey::from_openssh(fixture(name).trim()).unwrap()
}

pub fn certificate(name: &str) -> Certificate {
    Certificate::from_openssh(fixture(name).trim()).unwrap()
}

/// Form-encode a single fragment parameter
pub fn fragment(key: &str, value: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value.trim())
        .finish()
}

/// `ssh://` URL for a local test server with password credentials
pub fn ssh_url(port: u16, fragment: &str) -> String {
    format!(
        "ssh://{}:{}@127.0.0.1:{}{}#{}",
        SSH_USER, SSH_PASSWORD, port, REMOTE_SOCKET, fragment
    )
}

/// Accepts the test user by password or by the `user_ed25519` key
pub fn server_options(host_certificate: Option<&str>) -> SshServerOptions {
    SshServerOptions {
        user: SSH_USER.to_string(),
        password: Some(SSH_PASSWORD.to_string()),
        authorized_key: Some(public_key("user_ed25519.pub")),
        socket_path: REMOTE_SOCKET.to_string(),
        host_certificate: host_certificate.map(certificate),
    }
}

/// SSH server presenting `host_key`
pub async fn start_ssh_server(host_key: &str, api: Arc<FakePodman>) -> SshServer {
    SshServer::start(private_key(host_key), server_options(None), api).await
}

/// SSH server presenting `host_key`, plus `host_certificate` to clients that
/// ask for certificates
pub async fn start_certified_ssh_server(
    host_key: &str,
    host_certificate: &str,
    api: Arc<FakePodman>,
) -> SshServer {
    SshServer::start(
        private_key(host_key),
        server_options(Some(host_certificate)),
        api,
    )
    .await
}

/// Fake API behind a TCP listener, with a connected client
pub async fn tcp_client(api: Arc<FakePodman>) -> Client {
    let (addr, _listener) = api.listen_tcp().await;
    Client::connect_url(&format!("tcp://{}", addr), &ClientOptions::default())
        .await
        .unwrap()
}

/// Fake API behind the local SSH server, trusting the pinned host key
pub async fn ssh_client(api: Arc<FakePodman>) -> (SshServer, Client) {
    let server = start_ssh_server("host_ed25519", api).await;
    let url = ssh_url(
        server.port(),
        &fragment("pubkey", &fixture("host_ed25519.pub")),
    );
    let client = Client::connect_url(&url, &ClientOptions::default())
        .await
        .unwrap();
    (server, client)
}
