//! Newline-delimited JSON pull stream demultiplexer
//!
//! The response body of `POST images/pull` is read by a background task that
//! splits it into lines, classifies each line by the keys it carries and
//! pushes typed [`PullEvent`]s into a bounded channel. The task stops as soon
//! as the receiver goes away, dropping the response body with it.

use crate::error::{ClientError, Result};
use bytes::{Buf, BytesMut};
use http_body::Body;
use http_body_util::BodyExt;
use podwire_core::api::image::{ImagePullError, ImagePullImages, ImagePullStream, PullEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Events buffered between the reader task and the consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Longest line accepted before the stream is treated as malformed
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Live stream of pull events.
///
/// Each item is either an event or, once, the error that ended the stream.
/// Dropping this value stops the reader and releases the connection.
#[derive(Debug)]
pub struct PullEvents {
    rx: mpsc::Receiver<Result<PullEvent>>,
    task: JoinHandle<()>,
}

impl PullEvents {
    /// Start demultiplexing `body` on a background task
    pub fn spawn<B>(body: B) -> Self
    where
        B: Body + Send + Unpin + 'static,
        B::Data: Send,
        B::Error: Into<ClientError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = demultiplex(body, &tx) => {}
                _ = tx.closed() => {
                    debug!("Pull event receiver dropped, stopping reader");
                }
            }
        });
        Self { rx, task }
    }

    /// Next event; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Result<PullEvent>> {
        self.rx.recv().await
    }

    /// Drain the stream until it finishes and return the pulled image id
    pub async fn wait_for_image(mut self) -> Result<String> {
        while let Some(event) = self.recv().await {
            match event? {
                PullEvent::Progress(progress) => {
                    trace!("pull: {}", progress.stream.trim_end());
                }
                PullEvent::Error(failure) => return Err(ClientError::PullFailed(failure.error)),
                PullEvent::Images(images) => {
                    if let Some(id) = images.images.into_iter().next() {
                        return Ok(id);
                    }
                    if !images.id.is_empty() {
                        return Ok(images.id);
                    }
                    return Err(ClientError::protocol(
                        "pull completion event carried no image id",
                    ));
                }
            }
        }
        Err(ClientError::protocol(
            "pull stream ended without reporting an image id",
        ))
    }

    /// Whether the reader task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Hand out the raw receiver; the reader task keeps running detached
    pub fn into_receiver(self) -> mpsc::Receiver<Result<PullEvent>> {
        self.rx
    }
}

/// Read `body` to the end, forwarding events. Returns early when the
/// receiver is gone or after the single terminal error has been sent.
async fn demultiplex<B>(mut body: B, tx: &mpsc::Sender<Result<PullEvent>>)
where
    B: Body + Unpin,
    B::Error: Into<ClientError>,
{
    let mut buffer = BytesMut::new();
    // Bytes before this offset are known to hold no newline
    let mut scanned = 0;

    loop {
        while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
            let newline = scanned + offset;
            let line = buffer.split_to(newline + 1);
            scanned = 0;
            if !forward_line(&line[..newline], tx).await {
                return;
            }
        }
        scanned = buffer.len();

        if buffer.len() > MAX_LINE_LENGTH {
            let _ = tx
                .send(Err(ClientError::protocol(format!(
                    "pull stream line exceeds {} bytes",
                    MAX_LINE_LENGTH
                ))))
                .await;
            return;
        }

        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(mut data) = frame.into_data() {
                    while data.has_remaining() {
                        let chunk = data.chunk();
                        let len = chunk.len();
                        buffer.extend_from_slice(chunk);
                        data.advance(len);
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
            None => break,
        }
    }

    if !buffer.is_empty() {
        let line = buffer.split();
        forward_line(&line, tx).await;
    }
    debug!("Pull stream finished");
}

/// Classify one line and send what it yields. Returns false when the stream
/// must stop.
async fn forward_line(line: &[u8], tx: &mpsc::Sender<Result<PullEvent>>) -> bool {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return true;
    }

    match classify(line) {
        Ok(events) => {
            if events.is_empty() {
                trace!("Skipping unrecognized pull stream line");
            }
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            warn!("Malformed pull stream line: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn has_key(object: &Value, key: &str) -> bool {
    object.get(key).is_some_and(|v| !v.is_null())
}

fn reparse<T: serde::de::DeserializeOwned>(line: &[u8]) -> Result<T> {
    serde_json::from_slice(line)
        .map_err(|e| ClientError::protocol(format!("malformed pull stream event: {}", e)))
}

/// Turn one line into the events it carries, in `error`, `images`, `stream`
/// order. A line may carry several.
pub fn classify(line: &[u8]) -> Result<Vec<PullEvent>> {
    let object: Value = serde_json::from_slice(line)
        .map_err(|e| ClientError::protocol(format!("malformed pull stream line: {}", e)))?;
    if !object.is_object() {
        return Err(ClientError::protocol(
            "pull stream line is not a JSON object",
        ));
    }

    let mut events = Vec::new();
    if has_key(&object, "error") {
        events.push(PullEvent::Error(reparse::<ImagePullError>(line)?));
    }
    if has_key(&object, "images") {
        events.push(PullEvent::Images(reparse::<ImagePullImages>(line)?));
    }
    if has_key(&object, "stream") {
        events.push(PullEvent::Progress(reparse::<ImagePullStream>(line)?));
    }
    Ok(events)
}
