//! Shared metric state between the ingestion task, the samplers and the
//! snapshot step.
//!
//! Network counters are plain atomics: the ingestor adds with `fetch_add`,
//! the snapshot takes the per-cycle values with `swap(0)`. Each event is
//! therefore attributed to exactly one cycle. Bits are derived from bytes at
//! snapshot time so the two can never disagree about which cycle an event
//! belongs to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Direction of a network transfer, seen from the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "tx", alias = "sent")]
    Send,
    #[serde(alias = "rx", alias = "recv", alias = "received")]
    Receive,
}

#[derive(Debug, Default)]
struct NetCounters {
    cycle_sent: AtomicU64,
    cycle_received: AtomicU64,
    total_sent: AtomicU64,
    total_received: AtomicU64,
}

/// Latest sampled values, replaced by the samplers every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gauges {
    pub memory_mb: u64,
    pub cpu_percent: f64,
    pub interface_upload_kbps: f64,
    pub interface_download_kbps: f64,
    /// Interface bytes since the first interface baseline; never reset per cycle.
    pub interface_sent_bytes: u64,
    pub interface_received_bytes: u64,
}

impl Gauges {
    fn reset_cycle(&mut self) {
        self.memory_mb = 0;
        self.cpu_percent = 0.0;
        self.interface_upload_kbps = 0.0;
        self.interface_download_kbps = 0.0;
    }
}

/// Values taken by one snapshot-and-reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSnapshot {
    /// Time since the previous reset (zero on clock anomalies).
    pub elapsed: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub gauges: Gauges,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Plain data behind the lock stays consistent even if a holder panicked
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The single shared metrics record owned by a reporter.
#[derive(Debug)]
pub struct MetricCounters {
    net: NetCounters,
    gauges: Mutex<Gauges>,
    last_reset: Mutex<Instant>,
}

impl MetricCounters {
    pub fn new(now: Instant) -> Self {
        Self {
            net: NetCounters::default(),
            gauges: Mutex::new(Gauges::default()),
            last_reset: Mutex::new(now),
        }
    }

    /// Adds one transfer of `bytes` to the cycle and session counters.
    pub fn record(&self, direction: Direction, bytes: u64) {
        let (cycle, total) = match direction {
            Direction::Send => (&self.net.cycle_sent, &self.net.total_sent),
            Direction::Receive => (&self.net.cycle_received, &self.net.total_received),
        };
        cycle.fetch_add(bytes, Ordering::AcqRel);
        total.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Zeroes every network counter, cycle and session alike.
    pub fn reset_network(&self) {
        self.net.cycle_sent.store(0, Ordering::Release);
        self.net.cycle_received.store(0, Ordering::Release);
        self.net.total_sent.store(0, Ordering::Release);
        self.net.total_received.store(0, Ordering::Release);
    }

    pub fn set_memory_mb(&self, mb: u64) {
        lock(&self.gauges).memory_mb = mb;
    }

    pub fn set_cpu_percent(&self, percent: f64) {
        lock(&self.gauges).cpu_percent = percent;
    }

    /// Publishes interface rates and adds the byte deltas to the running totals.
    pub fn update_interface(
        &self,
        upload_kbps: f64,
        download_kbps: f64,
        sent_delta: u64,
        received_delta: u64,
    ) {
        let mut g = lock(&self.gauges);
        g.interface_upload_kbps = upload_kbps;
        g.interface_download_kbps = download_kbps;
        g.interface_sent_bytes = g.interface_sent_bytes.saturating_add(sent_delta);
        g.interface_received_bytes = g.interface_received_bytes.saturating_add(received_delta);
    }

    pub fn gauges(&self) -> Gauges {
        *lock(&self.gauges)
    }

    /// Reads everything accumulated since the last call and starts a new cycle.
    ///
    /// Concurrent callers are serialized on the cycle lock; ingestion keeps
    /// running and lands in either this cycle or the next one.
    pub fn snapshot_and_reset(&self, now: Instant) -> CycleSnapshot {
        let mut last_reset = lock(&self.last_reset);
        let elapsed = now.saturating_duration_since(*last_reset);

        let bytes_sent = self.net.cycle_sent.swap(0, Ordering::AcqRel);
        let bytes_received = self.net.cycle_received.swap(0, Ordering::AcqRel);
        let total_bytes_sent = self.net.total_sent.load(Ordering::Acquire);
        let total_bytes_received = self.net.total_received.load(Ordering::Acquire);

        let gauges = {
            let mut g = lock(&self.gauges);
            let current = *g;
            g.reset_cycle();
            current
        };

        *last_reset = now;

        CycleSnapshot {
            elapsed,
            bytes_sent,
            bytes_received,
            total_bytes_sent,
            total_bytes_received,
            gauges,
        }
    }
}
