//! In-process SSH server that forwards `direct-streamlocal` channels to a
//! [`FakePodman`]
//!
//! Connections and tunnels live in slot registries owned by the server.
//! Closing the server stops the listener, refuses further channels,
//! disconnects every session and aborts every tunnel.

use super::api_server::FakePodman;
use russh::keys::ssh_key::{Certificate, PrivateKey, PublicKey};
use russh::server::{self, Auth, ChannelOpenHandle, Msg, Session};
use russh::{Channel, ChannelOpenFailure, Disconnect};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fixed-size arena of task handles with slot reuse
#[derive(Default)]
struct Slots {
    entries: Vec<Option<JoinHandle<()>>>,
    free: Vec<usize>,
    opened: usize,
}

impl Slots {
    fn reserve(&mut self) -> usize {
        self.opened += 1;
        match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.entries.push(None);
                self.entries.len() - 1
            }
        }
    }

    fn fill(&mut self, slot: usize, handle: JoinHandle<()>) {
        self.entries[slot] = Some(handle);
    }

    fn release(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            if entry.take().is_some() {
                self.free.push(slot);
            }
        }
    }

    fn live(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    fn abort_all(&mut self) {
        for handle in self.entries.drain(..).flatten() {
            handle.abort();
        }
        self.free.clear();
    }
}

type Registry = Arc<Mutex<Slots>>;

/// Spawn `task` and keep its handle in `registry` until it finishes. The
/// lock is held until the handle is stored, so the task's own release
/// always comes after its fill.
fn track<F>(registry: &Registry, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut slots = registry.lock().unwrap();
    let slot = slots.reserve();
    let owner = registry.clone();
    let handle = tokio::spawn(async move {
        task.await;
        owner.lock().unwrap().release(slot);
    });
    slots.fill(slot, handle);
}

/// Who may log in, which socket path is served and which host certificate
/// is offered to clients that ask for one
#[derive(Clone)]
pub struct SshServerOptions {
    pub user: String,
    pub password: Option<String>,
    pub authorized_key: Option<PublicKey>,
    pub socket_path: String,
    pub host_certificate: Option<Certificate>,
}

struct Shared {
    options: SshServerOptions,
    api: Arc<FakePodman>,
    tunnels: Registry,
    rejected_channels: AtomicUsize,
    closed: watch::Sender<bool>,
}

struct ConnectionHandler {
    shared: Arc<Shared>,
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let options = &self.shared.options;
        if user == options.user && options.password.as_deref() == Some(password) {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let options = &self.shared.options;
        let allowed = options
            .authorized_key
            .as_ref()
            .is_some_and(|k| k.key_data() == public_key.key_data());
        if user == options.user && allowed {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_direct_streamlocal(
        &mut self,
        channel: Channel<Msg>,
        socket_path: &str,
        reply: ChannelOpenHandle,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if *self.shared.closed.borrow() || socket_path != self.shared.options.socket_path {
            self.shared.rejected_channels.fetch_add(1, Ordering::SeqCst);
            reply
                .reject(ChannelOpenFailure::AdministrativelyProhibited)
                .await;
            return Ok(());
        }

        reply.accept().await;
        let api = self.shared.api.clone();
        track(&self.shared.tunnels, async move {
            api.serve(Box::pin(channel.into_stream())).await;
        });
        Ok(())
    }
}

/// Running SSH server bound to an ephemeral localhost port
pub struct SshServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    connections: Registry,
    listener: JoinHandle<()>,
}

impl SshServer {
    pub async fn start(host_key: PrivateKey, options: SshServerOptions, api: Arc<FakePodman>) -> Self {
        Self::start_on("127.0.0.1:0", host_key, options, api)
            .await
            .unwrap()
    }

    /// Like [`SshServer::start`] on a chosen bind address
    pub async fn start_on(
        bind: &str,
        host_key: PrivateKey,
        options: SshServerOptions,
        api: Arc<FakePodman>,
    ) -> std::io::Result<Self> {
        let tcp = TcpListener::bind(bind).await?;
        let addr = tcp.local_addr()?;

        let config = Arc::new(server::Config {
            keys: vec![host_key],
            certificates: options.host_certificate.iter().cloned().collect(),
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let shared = Arc::new(Shared {
            options,
            api,
            tunnels: Registry::default(),
            rejected_channels: AtomicUsize::new(0),
            closed: watch::Sender::new(false),
        });
        let connections = Registry::default();

        let listener = {
            let shared = shared.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = tcp.accept().await {
                    let config = config.clone();
                    let handler = ConnectionHandler {
                        shared: shared.clone(),
                    };
                    let mut closed = shared.closed.subscribe();
                    track(&connections, async move {
                        let Ok(session) = server::run_stream(config, stream, handler).await else {
                            return;
                        };
                        let handle = session.handle();
                        tokio::pin!(session);
                        tokio::select! {
                            _ = &mut session => {}
                            _ = async { closed.wait_for(|closed| *closed).await.map(|_| ()) } => {
                                let _ = handle
                                    .disconnect(
                                        Disconnect::ByApplication,
                                        "server closing".to_string(),
                                        "en".to_string(),
                                    )
                                    .await;
                                let _ = session.await;
                            }
                        }
                    });
                }
            })
        };

        Ok(Self {
            addr,
            shared,
            connections,
            listener,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn connections_accepted(&self) -> usize {
        self.connections.lock().unwrap().opened
    }

    /// Tunnels opened so far
    pub fn tunnels_opened(&self) -> usize {
        self.shared.tunnels.lock().unwrap().opened
    }

    /// Tunnels still being served
    pub fn live_tunnels(&self) -> usize {
        self.shared.tunnels.lock().unwrap().live()
    }

    pub fn rejected_channels(&self) -> usize {
        self.shared.rejected_channels.load(Ordering::SeqCst)
    }

    /// Sessions still connected
    pub fn live_connections(&self) -> usize {
        self.connections.lock().unwrap().live()
    }

    /// Stop accepting and refuse new channels at once, abort every tunnel,
    /// then let each session send its disconnect
    pub fn close(&self) {
        self.listener.abort();
        self.shared.closed.send_replace(true);
        self.shared.tunnels.lock().unwrap().abort_all();
    }
}

impl Drop for SshServer {
    fn drop(&mut self) {
        self.close();
    }
}
