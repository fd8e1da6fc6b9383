//! Self-statistics of the reporter.
//!
//! Tracks how sampling cycles behave (timeouts, skipped processes, ingested
//! events) so degraded subsystems are visible in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Running statistics for a single metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Debug, Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

/// Point-in-time view of a [`Stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSnapshot {
    pub last: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        if let Ok(s) = self.inner.lock() {
            StatSnapshot {
                last: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            }
        } else {
            StatSnapshot::default()
        }
    }
}

/// Counters describing the reporter's own behaviour.
#[derive(Debug, Default)]
pub struct SamplerStats {
    pub cycles: AtomicU64,
    pub sample_timeouts: AtomicU64,
    /// Sub-samples skipped because the previous run of the same kind was still busy.
    pub samples_skipped_busy: AtomicU64,
    /// Per-process lookups that failed because the process had exited.
    pub exited_processes: AtomicU64,
    /// Per-process lookups that failed for any other reason.
    pub lookup_errors: AtomicU64,
    pub events_accepted: AtomicU64,
    pub events_filtered: AtomicU64,
    pub transport_failures: AtomicU64,
    /// Event batches applied against the previous targets because resolution stalled.
    pub resolve_timeouts: AtomicU64,
    pub collect_duration_ms: Stat,
}

impl SamplerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let d = self.collect_duration_ms.snapshot();
        format!(
            "cycles={} timeouts={} busy_skips={} exited={} lookup_errors={} events_accepted={} events_filtered={} transport_failures={} resolve_timeouts={} collect_ms(avg={:.1} max={:.1})",
            self.cycles.load(Ordering::Relaxed),
            self.sample_timeouts.load(Ordering::Relaxed),
            self.samples_skipped_busy.load(Ordering::Relaxed),
            self.exited_processes.load(Ordering::Relaxed),
            self.lookup_errors.load(Ordering::Relaxed),
            self.events_accepted.load(Ordering::Relaxed),
            self.events_filtered.load(Ordering::Relaxed),
            self.transport_failures.load(Ordering::Relaxed),
            self.resolve_timeouts.load(Ordering::Relaxed),
            d.avg,
            d.max,
        )
    }
}
