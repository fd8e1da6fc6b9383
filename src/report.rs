//! The immutable result of one sampling cycle.

use serde::Serialize;

use crate::counters::CycleSnapshot;
use crate::sampler::kbps;

/// Metrics for one cycle, handed to the caller and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Number of processes in the target set.
    pub process_count: usize,
    /// CPU usage of all targets, in percent of the whole machine.
    pub process_cpu_percent: f64,
    /// Sum of the targets' peak working sets in MB.
    pub process_memory_mb: u64,
    /// KB sent by the targets since the previous report.
    pub process_sent_kb: u64,
    /// KB received by the targets since the previous report.
    pub process_received_kb: u64,
    /// KB sent by the targets since the ingestion session started.
    pub process_sent_total_kb: u64,
    /// KB received by the targets since the ingestion session started.
    pub process_received_total_kb: u64,
    pub process_upload_kbps: u64,
    pub process_download_kbps: u64,
    /// KB sent through the selected interface since it was first sampled.
    pub network_sent_kb: u64,
    /// KB received through the selected interface since it was first sampled.
    pub network_received_kb: u64,
    pub network_upload_kbps: u64,
    pub network_download_kbps: u64,
    /// Length of the cycle this report covers.
    pub elapsed_seconds: f64,
    /// Whether network events were being ingested when the report was built.
    pub network_ingestion_active: bool,
    /// Whether an interface matched the configured address.
    pub interface_selected: bool,
    /// Number of sub-samples that did not finish within the sample timeout.
    pub sample_timeouts: u32,
    /// Number of sub-samples skipped because an earlier run of the same
    /// sample was still stalled.
    pub samples_skipped: u32,
}

/// Cycle-level facts that do not come from the counters.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CycleInfo {
    pub process_count: usize,
    pub network_ingestion_active: bool,
    pub interface_selected: bool,
    pub sample_timeouts: u32,
    pub samples_skipped: u32,
}

fn round_kbps(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.round() as u64
    } else {
        0
    }
}

impl Report {
    pub(crate) fn from_snapshot(s: &CycleSnapshot, info: CycleInfo) -> Self {
        Self {
            process_count: info.process_count,
            process_cpu_percent: s.gauges.cpu_percent,
            process_memory_mb: s.gauges.memory_mb,
            process_sent_kb: s.bytes_sent / 1024,
            process_received_kb: s.bytes_received / 1024,
            process_sent_total_kb: s.total_bytes_sent / 1024,
            process_received_total_kb: s.total_bytes_received / 1024,
            process_upload_kbps: round_kbps(kbps(s.bytes_sent, s.elapsed)),
            process_download_kbps: round_kbps(kbps(s.bytes_received, s.elapsed)),
            network_sent_kb: s.gauges.interface_sent_bytes / 1024,
            network_received_kb: s.gauges.interface_received_bytes / 1024,
            network_upload_kbps: round_kbps(s.gauges.interface_upload_kbps),
            network_download_kbps: round_kbps(s.gauges.interface_download_kbps),
            elapsed_seconds: s.elapsed.as_secs_f64(),
            network_ingestion_active: info.network_ingestion_active,
            interface_selected: info.interface_selected,
            sample_timeouts: info.sample_timeouts,
            samples_skipped: info.samples_skipped,
        }
    }

    /// False when part of this report reads as zero only because a
    /// sub-sample timed out or was skipped.
    pub fn is_complete(&self) -> bool {
        self.sample_timeouts == 0 && self.samples_skipped == 0
    }
}
