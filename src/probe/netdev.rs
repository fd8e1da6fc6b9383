//! Network interface statistics and address lookup.
//!
//! Byte counters are read from /proc/net/dev; unicast addresses come from
//! `getifaddrs(3)`.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use super::{InterfaceAddress, InterfaceCounters, InterfaceHandle, InterfaceProbe, ProbeError};

/// Network interface statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetDevStats {
    pub receive_bytes: u64,
    pub transmit_bytes: u64,
}

/// Parses the content of /proc/net/dev.
///
/// Returns a HashMap mapping interface names to their statistics.
pub fn parse_netdev(content: &str) -> HashMap<String, NetDevStats> {
    let mut stats = HashMap::new();

    // The first two lines are headers
    for line in content.lines().skip(2) {
        let Some((interface, values)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = values.split_whitespace().collect();
        if values.len() < 16 {
            continue; // Skip malformed lines
        }

        stats.insert(
            interface.trim().to_string(),
            NetDevStats {
                receive_bytes: values[0].parse().unwrap_or(0),
                transmit_bytes: values[8].parse().unwrap_or(0),
            },
        );
    }

    stats
}

/// [`InterfaceProbe`] for Linux.
#[derive(Debug, Clone)]
pub struct NetDevProbe {
    net_dev: PathBuf,
}

impl Default for NetDevProbe {
    fn default() -> Self {
        Self::new("/proc/net/dev")
    }
}

impl NetDevProbe {
    pub fn new(net_dev: impl Into<PathBuf>) -> Self {
        Self {
            net_dev: net_dev.into(),
        }
    }

    /// Reads all interface statistics.
    pub fn read_stats(&self) -> Result<HashMap<String, NetDevStats>, ProbeError> {
        let content = fs::read_to_string(&self.net_dev).map_err(|e| ProbeError::Io {
            path: self.net_dev.display().to_string(),
            source: e,
        })?;
        Ok(parse_netdev(&content))
    }
}

impl InterfaceProbe for NetDevProbe {
    fn list_addresses(&self) -> Result<Vec<InterfaceAddress>, ProbeError> {
        let addrs =
            nix::ifaddrs::getifaddrs().map_err(|e| ProbeError::Enumeration(e.to_string()))?;

        let mut out = Vec::new();
        for ifaddr in addrs {
            let Some(storage) = ifaddr.address else {
                continue;
            };
            let address = if let Some(v4) = storage.as_sockaddr_in() {
                IpAddr::V4(v4.ip())
            } else if let Some(v6) = storage.as_sockaddr_in6() {
                IpAddr::V6(v6.ip())
            } else {
                // AF_PACKET and friends carry no IP
                continue;
            };
            out.push(InterfaceAddress {
                name: ifaddr.interface_name,
                address,
            });
        }
        Ok(out)
    }

    fn byte_counters(&self, handle: &InterfaceHandle) -> Result<InterfaceCounters, ProbeError> {
        let stats = self.read_stats()?;
        let s = stats
            .get(&handle.name)
            .ok_or_else(|| ProbeError::InterfaceNotFound(handle.name.clone()))?;
        Ok(InterfaceCounters {
            bytes_sent: s.transmit_bytes,
            bytes_received: s.receive_bytes,
        })
    }
}
