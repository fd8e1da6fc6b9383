//! Event transports shipped with the reporter.
//!
//! Kernel-level packet tracing lives outside this crate; these sources cover
//! in-process producers, replay of events recorded by an external tracer, and
//! the "no transport" case.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{EventStream, NetEvent, NetEventSource, TransportError};

/// Error returned when the ingestion side has gone away.
#[derive(Debug, thiserror::Error)]
#[error("event channel closed")]
pub struct ChannelClosed;

/// In-process transport: whoever holds the [`EventSender`] produces events.
pub struct ChannelEventSource {
    rx: EventStream,
}

/// Producer half of a [`ChannelEventSource`].
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Result<NetEvent, TransportError>>,
}

impl ChannelEventSource {
    pub fn new(capacity: usize) -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { rx }, EventSender { tx })
    }
}

impl NetEventSource for ChannelEventSource {
    fn subscribe(self: Box<Self>) -> Result<EventStream, TransportError> {
        Ok(self.rx)
    }
}

impl EventSender {
    pub async fn send(&self, event: NetEvent) -> Result<(), ChannelClosed> {
        self.tx.send(Ok(event)).await.map_err(|_| ChannelClosed)
    }

    /// Sends from a non-async producer thread (e.g. a tracing callback).
    pub fn blocking_send(&self, event: NetEvent) -> Result<(), ChannelClosed> {
        self.tx.blocking_send(Ok(event)).map_err(|_| ChannelClosed)
    }

    /// Reports a transport failure; the ingestor ends the session on receipt.
    pub async fn fail(&self, error: TransportError) -> Result<(), ChannelClosed> {
        self.tx.send(Err(error)).await.map_err(|_| ChannelClosed)
    }
}

/// Transport used when nothing can deliver events; it always fails to start.
#[derive(Debug, Clone)]
pub struct UnavailableEventSource {
    reason: String,
}

impl UnavailableEventSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl NetEventSource for UnavailableEventSource {
    fn subscribe(self: Box<Self>) -> Result<EventStream, TransportError> {
        Err(TransportError::Unavailable(self.reason))
    }
}

/// Reads newline-delimited JSON events from a file, optionally following it
/// as it grows.
///
/// Each line looks like `{"pid":1234,"size":512,"direction":"send"}`. Blank
/// lines and lines starting with `#` are ignored; malformed lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesEventSource {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
    capacity: usize,
}

impl JsonLinesEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: false,
            poll_interval: Duration::from_millis(250),
            capacity: 4096,
        }
    }

    /// Keep reading after EOF, polling for appended lines.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Parses one line of the JSON-lines event format.
pub fn parse_event_line(line: &str) -> Option<Result<NetEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Parses a complete line and sends it on; false once the receiver is gone.
async fn forward_line(raw: &[u8], tx: &mpsc::Sender<Result<NetEvent, TransportError>>) -> bool {
    let line = String::from_utf8_lossy(raw);
    match parse_event_line(&line) {
        Some(Ok(event)) => tx.send(Ok(event)).await.is_ok(),
        Some(Err(e)) => {
            debug!("Skipping malformed event line '{}': {}", line.trim_end(), e);
            true
        }
        None => true,
    }
}

impl NetEventSource for JsonLinesEventSource {
    fn subscribe(self: Box<Self>) -> Result<EventStream, TransportError> {
        let file = std::fs::File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                TransportError::PermissionDenied(format!("{}: {}", self.path.display(), e))
            }
            _ => TransportError::Io(e),
        })?;
        info!("Reading network events from {}", self.path.display());

        let (tx, rx) = mpsc::channel(self.capacity);
        let mut reader = BufReader::new(tokio::fs::File::from_std(file));
        let follow = self.follow;
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            // Holds a partially written line until its newline arrives.
            let mut buf = Vec::new();
            loop {
                let read = tokio::select! {
                    _ = tx.closed() => break,
                    read = reader.read_until(b'\n', &mut buf) => read,
                };

                match read {
                    Ok(0) if follow => {
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Ok(0) => {
                        // Last line without a trailing newline.
                        if !buf.is_empty() {
                            forward_line(&buf, &tx).await;
                        }
                        break;
                    }
                    Ok(_) if buf.ends_with(b"\n") => {
                        let delivered = forward_line(&buf, &tx).await;
                        buf.clear();
                        if !delivered {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Io(e))).await;
                        break;
                    }
                }
            }
            debug!("Event file reader finished");
        });

        Ok(rx)
    }
}
