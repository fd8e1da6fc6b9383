//! Operating-system introspection used by the sampler.
//!
//! This module provides:
//! - `procfs`: per-process CPU time, peak memory and process listing from /proc
//! - `netdev`: interface address lookup and byte counters from /proc/net/dev
//!
//! Both are reached only through the [`ProcessProbe`] and [`InterfaceProbe`]
//! traits so the sampler can be exercised with fakes.

pub mod netdev;
pub mod procfs;

use std::net::IpAddr;
use std::time::Duration;

pub use netdev::NetDevProbe;
pub use procfs::{ProcfsProbe, CLK_TCK, LOGICAL_CORES};

/// Operating-system process identifier.
pub type Pid = u32;

/// Errors raised by per-process and per-interface lookups.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The process went away between resolution and lookup.
    #[error("process {0} no longer exists")]
    Exited(Pid),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("interface enumeration failed: {0}")]
    Enumeration(String),
}

impl ProbeError {
    /// True for the "process exited" case that samplers skip silently.
    pub fn is_exited(&self) -> bool {
        matches!(self, ProbeError::Exited(_))
    }
}

/// A running process as seen at listing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
}

/// Per-process introspection.
pub trait ProcessProbe: Send + Sync {
    /// Lists all currently running processes.
    fn list_processes(&self) -> Vec<ProcessInfo>;

    /// Cumulative user+system CPU time consumed since process start.
    fn cpu_time(&self, pid: Pid) -> Result<Duration, ProbeError>;

    /// Peak resident set size (high-water mark) in bytes.
    fn peak_memory_bytes(&self, pid: Pid) -> Result<u64, ProbeError>;
}

/// One unicast address bound to a network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub address: IpAddr,
}

/// Interface selected for interface-level throughput sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceHandle {
    pub name: String,
    pub address: IpAddr,
}

/// Cumulative byte counters of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Network interface introspection.
pub trait InterfaceProbe: Send + Sync {
    /// Lists every unicast address of every interface.
    fn list_addresses(&self) -> Result<Vec<InterfaceAddress>, ProbeError>;

    /// Cumulative counters for the given interface.
    fn byte_counters(&self, handle: &InterfaceHandle) -> Result<InterfaceCounters, ProbeError>;

    /// Finds the first interface carrying `ip` as one of its unicast addresses.
    fn find_by_ip(&self, ip: IpAddr) -> Option<InterfaceHandle> {
        match self.list_addresses() {
            Ok(addrs) => addrs
                .into_iter()
                .find(|a| a.address == ip)
                .map(|a| InterfaceHandle {
                    name: a.name,
                    address: a.address,
                }),
            Err(e) => {
                tracing::warn!("Network interfaces unavailable: {}", e);
                None
            }
        }
    }
}
