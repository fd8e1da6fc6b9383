//! Differential sampling of CPU, memory and interface counters.
//!
//! Each of the three samples owns its own slice of state behind its own lock,
//! so they can run concurrently with each other. Two runs of the same sample
//! never overlap: if the previous run is still stuck in an OS call the new
//! one is skipped instead of queueing behind it.

use rayon::prelude::*;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::counters::MetricCounters;
use crate::probe::{
    InterfaceCounters, InterfaceHandle, InterfaceProbe, Pid, ProbeError, ProcessProbe,
};
use crate::resolver::ProcessResolver;
use crate::stats::SamplerStats;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct CpuBaseline {
    time: Instant,
    total: Duration,
}

#[derive(Debug, Clone, Copy)]
struct InterfaceBaseline {
    time: Instant,
    counters: InterfaceCounters,
}

/// Result of one memory sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Size of the target set the sample ran over.
    pub process_count: usize,
    pub memory_mb: u64,
}

/// Interface throughput computed by one interface sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InterfaceRates {
    pub upload_kbps: f64,
    pub download_kbps: f64,
}

/// CPU usage in percent of the whole machine.
///
/// `(current - last) / elapsed / cores`, clamped to `[0, 100]`. A shrinking
/// target set makes the delta negative, which reports as zero.
pub fn cpu_usage_percent(last: Duration, current: Duration, elapsed: Duration, cores: usize) -> f64 {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    if elapsed_ms <= 0.0 || cores == 0 {
        return 0.0;
    }
    let delta_ms = current.as_secs_f64() * 1000.0 - last.as_secs_f64() * 1000.0;
    let usage = delta_ms / elapsed_ms / cores as f64;
    if !usage.is_finite() || usage <= 0.0 {
        0.0
    } else {
        (usage * 100.0).min(100.0)
    }
}

/// Throughput in kilobits per second for `delta_bytes` over `elapsed`.
pub fn kbps(delta_bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let rate = delta_bytes as f64 * 8.0 / 1000.0 / secs;
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

/// A sample was skipped because its previous run has not returned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("previous {0} sample is still running")]
pub struct Busy(pub &'static str);

/// Takes a sample's lock without waiting; `None` means a run is in flight.
fn try_lock_subset<T>(m: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match m.try_lock() {
        Ok(g) => Some(g),
        Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Computes CPU, memory and interface samples against stored baselines.
pub struct DifferentialSampler {
    resolver: Arc<dyn ProcessResolver>,
    processes: Arc<dyn ProcessProbe>,
    interfaces: Arc<dyn InterfaceProbe>,
    interface: Option<InterfaceHandle>,
    clock: Arc<dyn Clock>,
    counters: Arc<MetricCounters>,
    stats: Arc<SamplerStats>,
    logical_cores: usize,
    memory: Mutex<()>,
    cpu: Mutex<Option<CpuBaseline>>,
    network: Mutex<Option<InterfaceBaseline>>,
}

impl DifferentialSampler {
    /// Creates a sampler; the interface (if any) is selected here, once.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        resolver: Arc<dyn ProcessResolver>,
        processes: Arc<dyn ProcessProbe>,
        interfaces: Arc<dyn InterfaceProbe>,
        network_ip: Option<IpAddr>,
        clock: Arc<dyn Clock>,
        counters: Arc<MetricCounters>,
        stats: Arc<SamplerStats>,
        logical_cores: usize,
    ) -> Self {
        let interface = network_ip.and_then(|ip| match interfaces.find_by_ip(ip) {
            Some(handle) => {
                info!(
                    "Sampling network interface {} ({})",
                    handle.name, handle.address
                );
                Some(handle)
            }
            None => {
                warn!(
                    "⚠️  No network interface has address {} - interface metrics disabled",
                    ip
                );
                None
            }
        });

        Self {
            resolver,
            processes,
            interfaces,
            interface,
            clock,
            counters,
            stats,
            logical_cores: logical_cores.max(1),
            memory: Mutex::new(()),
            cpu: Mutex::new(None),
            network: Mutex::new(None),
        }
    }

    /// The interface selected at construction.
    pub fn interface(&self) -> Option<&InterfaceHandle> {
        self.interface.as_ref()
    }

    fn note_lookup_error(&self, pid: Pid, what: &str, e: &ProbeError) {
        if e.is_exited() {
            debug!("Process {} exited before {} lookup", pid, what);
            SamplerStats::inc(&self.stats.exited_processes);
        } else {
            debug!("Failed to read {} for pid {}: {}", what, pid, e);
            SamplerStats::inc(&self.stats.lookup_errors);
        }
    }

    fn busy(&self, what: &'static str) -> Busy {
        debug!("Previous {} sample still running, skipping", what);
        SamplerStats::inc(&self.stats.samples_skipped_busy);
        Busy(what)
    }

    /// Sums the peak working set of all targets and publishes it in MB.
    ///
    /// Fails with [`Busy`] if the previous memory sample is still running.
    pub fn sample_memory(&self) -> Result<MemorySample, Busy> {
        let Some(_guard) = try_lock_subset(&self.memory) else {
            return Err(self.busy("memory"));
        };

        let pids = self.resolver.resolve().to_sorted_vec();
        let bytes: u64 = pids
            .par_iter()
            .filter_map(|&pid| match self.processes.peak_memory_bytes(pid) {
                Ok(b) => Some(b),
                Err(e) => {
                    self.note_lookup_error(pid, "memory", &e);
                    None
                }
            })
            .sum();

        let memory_mb = bytes / BYTES_PER_MB;
        self.counters.set_memory_mb(memory_mb);
        Ok(MemorySample {
            process_count: pids.len(),
            memory_mb,
        })
    }

    /// Computes CPU usage since the previous CPU sample and publishes it.
    ///
    /// The first call only records the baseline and reports 0 %.
    pub fn sample_cpu(&self) -> Result<f64, Busy> {
        let Some(mut baseline) = try_lock_subset(&self.cpu) else {
            return Err(self.busy("cpu"));
        };

        let pids = self.resolver.resolve().to_sorted_vec();
        let total: Duration = pids
            .par_iter()
            .filter_map(|&pid| match self.processes.cpu_time(pid) {
                Ok(t) => Some(t),
                Err(e) => {
                    self.note_lookup_error(pid, "cpu time", &e);
                    None
                }
            })
            .sum();

        let now = self.clock.now();
        let percent = match *baseline {
            None => 0.0,
            Some(last) => cpu_usage_percent(
                last.total,
                total,
                now.saturating_duration_since(last.time),
                self.logical_cores,
            ),
        };
        *baseline = Some(CpuBaseline { time: now, total });

        self.counters.set_cpu_percent(percent);
        Ok(percent)
    }

    /// Computes interface throughput since the previous interface sample.
    ///
    /// Returns `Ok(None)` when no interface was selected or its counters
    /// could not be read, and [`Busy`] if the previous interface sample is
    /// still running.
    pub fn sample_interface(&self) -> Result<Option<InterfaceRates>, Busy> {
        let Some(handle) = self.interface.as_ref() else {
            return Ok(None);
        };
        let Some(mut baseline) = try_lock_subset(&self.network) else {
            return Err(self.busy("interface"));
        };

        let current = match self.interfaces.byte_counters(handle) {
            Ok(c) => c,
            Err(e) => {
                debug!("Failed to read counters of {}: {}", handle.name, e);
                return Ok(None);
            }
        };
        let now = self.clock.now();

        let Some(last) = *baseline else {
            *baseline = Some(InterfaceBaseline {
                time: now,
                counters: current,
            });
            self.counters.update_interface(0.0, 0.0, 0, 0);
            return Ok(Some(InterfaceRates::default()));
        };

        let elapsed = now.saturating_duration_since(last.time);
        // A counter that went backwards (reset, wrap) contributes nothing
        let sent = current
            .bytes_sent
            .checked_sub(last.counters.bytes_sent)
            .unwrap_or(0);
        let received = current
            .bytes_received
            .checked_sub(last.counters.bytes_received)
            .unwrap_or(0);

        let rates = InterfaceRates {
            upload_kbps: kbps(sent, elapsed),
            download_kbps: kbps(received, elapsed),
        };
        *baseline = Some(InterfaceBaseline {
            time: now,
            counters: current,
        });

        self.counters
            .update_interface(rates.upload_kbps, rates.download_kbps, sent, received);
        Ok(Some(rates))
    }
}
