//! Streaming tar uploads
//!
//! The caller's builder runs on a blocking worker and writes into a
//! [`tar::Builder`] whose sink is an [`ArchiveWriter`]. The writer cuts the
//! archive into chunks and pushes them through a bounded channel that backs
//! the PUT request body, so the archive is never held in memory as a whole.

use crate::body::ChannelBody;
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::resources::escape_segment;
use bytes::Bytes;
use podwire_core::api::API_PREFIX;
use std::io::{self, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Size of the chunks handed to the request body
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Chunks that may wait in the pipe before the builder blocks
pub const PIPE_CAPACITY: usize = 4;

pub const TAR_CONTENT_TYPE: &str = "application/x-tar";

/// One regular file written into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub uid: u64,
    pub gid: u64,
    pub mode: u32,
    pub content: Vec<u8>,
}

/// Append a regular file with fixed mtime 0. Leading slashes are dropped,
/// since tar entries are relative to the extraction root.
pub fn append_entry<W: Write>(builder: &mut tar::Builder<W>, entry: &ArchiveEntry) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(entry.content.len() as u64);
    header.set_mode(entry.mode);
    header.set_uid(entry.uid);
    header.set_gid(entry.gid);
    header.set_mtime(0);

    builder.append_data(
        &mut header,
        entry.path.trim_start_matches('/'),
        entry.content.as_slice(),
    )
}

/// Blocking `Write` sink feeding a [`ChannelBody`].
///
/// Must only be used off the async runtime threads, since a full pipe blocks
/// the writer until the transmitter catches up.
pub struct ArchiveWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: Vec<u8>,
    abandoned: bool,
}

impl ArchiveWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            abandoned: false,
        }
    }

    /// Discard everything written from now on
    fn abandon(&mut self) {
        self.abandoned = true;
        self.buffer.clear();
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_SIZE));
        self.tx.blocking_send(Ok(Bytes::from(chunk))).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive upload stopped reading",
            )
        })
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.abandoned {
            return Ok(buf.len());
        }
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.abandoned {
            return Ok(());
        }
        self.send_buffer()
    }
}

/// Run `build` against a fresh archive and close the pipe with its outcome
fn produce<F>(tx: mpsc::Sender<io::Result<Bytes>>, build: F) -> io::Result<()>
where
    F: FnOnce(&mut tar::Builder<ArchiveWriter>) -> io::Result<()>,
{
    let mut builder = tar::Builder::new(ArchiveWriter::new(tx.clone()));

    let result = match build(&mut builder) {
        Ok(()) => builder.into_inner().and_then(|mut writer| writer.flush()),
        Err(e) => {
            // The trailer written on drop must not reach the request body
            builder.get_mut().abandon();
            drop(builder);
            Err(e)
        }
    };

    if let Err(e) = &result {
        let _ = tx.blocking_send(Err(io::Error::new(e.kind(), e.to_string())));
    }
    result
}

/// Combine the outcomes of the builder and the request
fn join_outcomes(
    sent: Result<()>,
    built: std::result::Result<io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match built {
        Ok(Ok(())) => sent,
        // The builder only saw the pipe close; the request knows why
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe && sent.is_err() => sent,
        Ok(Err(source)) => Err(ClientError::Archive { source }),
        Err(e) => Err(ClientError::Archive {
            source: io::Error::other(format!("archive builder did not finish: {}", e)),
        }),
    }
}

impl Client {
    /// Upload a tar archive built by `build` into the root of a container's
    /// filesystem.
    ///
    /// Succeeds only if both the builder and the request succeed; a builder
    /// error wins over the request error it causes.
    pub async fn upload_archive<F>(&self, container: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut tar::Builder<ArchiveWriter>) -> io::Result<()> + Send + 'static,
    {
        let path = format!(
            "{}/containers/{}/archive?path=%2F",
            API_PREFIX,
            escape_segment(container)
        );

        let (tx, body) = ChannelBody::channel(PIPE_CAPACITY);
        let producer = tokio::task::spawn_blocking(move || produce(tx, build));

        let (sent, built) = tokio::join!(
            self.stream(&path, TAR_CONTENT_TYPE, body.boxed()),
            producer
        );

        let outcome = join_outcomes(sent, built);
        match &outcome {
            Ok(()) => debug!("Uploaded archive to container {}", container),
            Err(e) => warn!("Archive upload to container {} failed: {}", container, e),
        }
        outcome
    }
}
