//! Client library for the Podman libpod REST API
//!
//! A [`Client`] is dialed once against an endpoint URL (`tcp://`, `unix://`
//! or `ssh://`) and then issues typed requests over that single transport.
//! SSH endpoints tunnel every HTTP connection through a
//! `direct-streamlocal` channel of one authenticated session.

pub mod archive;
pub mod body;
pub mod cache;
pub mod client;
pub mod connector;
pub mod error;
pub mod pull;
pub mod resources;
pub mod transport;

pub use archive::{ArchiveEntry, ArchiveWriter, append_entry};
pub use cache::ClientCache;
pub use client::{Client, ClientOptions, SSH_BASE_URL, UNIX_BASE_URL};
pub use error::{ClientError, Result};
pub use pull::PullEvents;
pub use transport::SshAuthConfig;
