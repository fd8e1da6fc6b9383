//! Interfaces command implementation.
//!
//! Lists network interfaces with their addresses and byte counters.

use herakles_process_perf::{InterfaceHandle, InterfaceProbe, NetDevProbe};

use crate::output::thousands;

/// Lists every interface address; `--network` accepts any of them.
pub fn command_interfaces() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌐 Herakles Process Performance - Network Interfaces");
    println!("====================================================");

    let probe = NetDevProbe::default();
    let mut addresses = probe.list_addresses()?;
    addresses.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));

    println!(
        "{:<16} {:<40} {:>16} {:>16}",
        "INTERFACE", "ADDRESS", "SENT (KB)", "RECEIVED (KB)"
    );
    println!("{}", "─".repeat(91));

    for a in &addresses {
        let handle = InterfaceHandle {
            name: a.name.clone(),
            address: a.address,
        };
        let (sent, received) = match probe.byte_counters(&handle) {
            Ok(c) => (thousands(c.bytes_sent / 1024), thousands(c.bytes_received / 1024)),
            Err(_) => ("-".into(), "-".into()),
        };
        println!(
            "{:<16} {:<40} {:>16} {:>16}",
            a.name,
            a.address.to_string(),
            sent,
            received
        );
    }

    println!("\n📊 Total: {} addresses", addresses.len());
    Ok(())
}
