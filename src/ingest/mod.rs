//! Background ingestion of per-process network transfer events.
//!
//! An [`NetEventSource`] hands the ingestor a channel of events. The ingestor
//! runs as its own task for the reporter's lifetime, filters events against
//! the current target set and adds matching transfers to the shared counters.
//! Transport failures zero the network counters and end the session; they
//! never propagate to the caller.

pub mod sources;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::counters::{Direction, MetricCounters};
use crate::probe::Pid;
use crate::resolver::{ProcessResolver, TargetSet};
use crate::stats::SamplerStats;

pub use sources::{ChannelEventSource, JsonLinesEventSource, UnavailableEventSource};

/// Upper bound on events checked against a single target-set resolution.
const MAX_BATCH: usize = 1024;

/// One network transfer attributed to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetEvent {
    pub pid: Pid,
    /// Payload size in bytes.
    pub size: u64,
    pub direction: Direction,
}

impl NetEvent {
    pub fn send(pid: Pid, size: u64) -> Self {
        Self {
            pid,
            size,
            direction: Direction::Send,
        }
    }

    pub fn receive(pid: Pid, size: u64) -> Self {
        Self {
            pid,
            size,
            direction: Direction::Receive,
        }
    }
}

/// Failures of the event transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("event transport unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient privilege for event transport: {0}")]
    PermissionDenied(String),

    #[error("event stream failed: {0}")]
    Stream(String),

    #[error("event transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiving end of a subscribed event stream.
///
/// An `Err` item means the transport failed mid-stream; a closed channel
/// means the stream ended normally.
pub type EventStream = mpsc::Receiver<Result<NetEvent, TransportError>>;

/// A source of network transfer events.
pub trait NetEventSource: Send + 'static {
    /// Starts the transport. Called once, from inside the ingestion task.
    fn subscribe(self: Box<Self>) -> Result<EventStream, TransportError>;
}

/// Owned handle to the running ingestion task.
pub(crate) struct IngestorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl IngestorHandle {
    /// True while the ingestion session is receiving events.
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops the subscription and waits for the task to finish.
    pub(crate) async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Event ingestion task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for IngestorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the ingestion task on the current tokio runtime.
pub(crate) fn spawn_ingestor(
    source: Box<dyn NetEventSource>,
    resolver: Arc<dyn ProcessResolver>,
    counters: Arc<MetricCounters>,
    stats: Arc<SamplerStats>,
    resolve_timeout: Duration,
) -> IngestorHandle {
    let cancel = CancellationToken::new();
    let active = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run_ingestor(
        source,
        resolver,
        counters,
        stats,
        resolve_timeout,
        cancel.clone(),
        active.clone(),
    ));

    IngestorHandle {
        cancel,
        task: Some(task),
        active,
    }
}

async fn run_ingestor(
    source: Box<dyn NetEventSource>,
    resolver: Arc<dyn ProcessResolver>,
    counters: Arc<MetricCounters>,
    stats: Arc<SamplerStats>,
    resolve_timeout: Duration,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
) {
    counters.reset_network();

    let mut rx = match source.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            warn!(
                "⚠️  Network event ingestion disabled for this session: {}",
                e
            );
            SamplerStats::inc(&stats.transport_failures);
            counters.reset_network();
            return;
        }
    };

    active.store(true, Ordering::Release);
    info!("Network event ingestion started");

    let mut batch = Vec::with_capacity(MAX_BATCH);
    // Targets of the last resolution that finished in time; used while a
    // newer one is stalled.
    let mut targets = TargetSet::default();
    let mut pending: Option<JoinHandle<TargetSet>> = None;

    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Event ingestion cancelled");
                break;
            }
            item = rx.recv() => item,
        };
        let Some(first) = first else {
            info!("Network event stream ended");
            break;
        };

        batch.push(first);
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        // A stalled resolution is awaited again instead of starting another
        let mut job = pending.take().unwrap_or_else(|| {
            let resolver = resolver.clone();
            tokio::task::spawn_blocking(move || resolver.resolve())
        });
        tokio::select! {
            _ = cancel.cancelled() => break,
            r = tokio::time::timeout(resolve_timeout, &mut job) => match r {
                Ok(Ok(t)) => targets = t,
                Ok(Err(e)) => {
                    warn!("Target resolution for event batch failed: {}", e);
                    targets = TargetSet::default();
                }
                Err(_) => {
                    warn!(
                        "⚠️  Target resolution did not finish within {}ms, using previous targets",
                        resolve_timeout.as_millis()
                    );
                    SamplerStats::inc(&stats.resolve_timeouts);
                    pending = Some(job);
                }
            },
        }

        if let Err(e) = apply_batch(&mut batch, &targets, &counters, &stats) {
            warn!(
                "⚠️  Network event stream failed, network metrics disabled for this session: {}",
                e
            );
            SamplerStats::inc(&stats.transport_failures);
            counters.reset_network();
            break;
        }
    }

    drop(rx);
    active.store(false, Ordering::Release);
}

/// Adds the matching events of a batch to the counters, draining it.
fn apply_batch(
    batch: &mut Vec<Result<NetEvent, TransportError>>,
    targets: &TargetSet,
    counters: &MetricCounters,
    stats: &SamplerStats,
) -> Result<(), TransportError> {
    let mut accepted = 0u64;
    let mut filtered = 0u64;

    for item in batch.drain(..) {
        let event = item?;
        if targets.contains(event.pid) {
            counters.record(event.direction, event.size);
            accepted += 1;
        } else {
            filtered += 1;
        }
    }

    SamplerStats::add(&stats.events_accepted, accepted);
    SamplerStats::add(&stats.events_filtered, filtered);
    Ok(())
}
