//! Processes command implementation.
//!
//! Lists the processes the reporter would currently monitor.

use std::sync::Arc;

use herakles_process_perf::{NameResolver, ProcessProbe, ProcfsProbe};

use crate::config::Config;
use crate::output::{process_label, thousands};

/// Lists the target processes with their CPU time and peak memory.
///
/// Names given to the subcommand take precedence over the configured ones.
pub fn command_processes(
    config: &Config,
    names: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let names = if names.is_empty() {
        config.names()
    } else {
        names.to_vec()
    };
    println!("📋 Herakles Process Performance - Target Processes");
    println!("==================================================");
    println!("Filter: {}\n", process_label(&names));

    let probe = Arc::new(ProcfsProbe::default());
    let resolver = NameResolver::new(names, probe.clone());

    let mut targets: Vec<_> = probe
        .list_processes()
        .into_iter()
        .filter(|p| resolver.matches(p.pid, &p.name))
        .collect();
    targets.sort_by_key(|p| p.pid);

    println!("{:>8}  {:<24} {:>12} {:>14}", "PID", "NAME", "CPU (s)", "PEAK MEM (KB)");
    println!("{}", "─".repeat(62));

    for p in &targets {
        let cpu = probe
            .cpu_time(p.pid)
            .map(|d| format!("{:.2}", d.as_secs_f64()))
            .unwrap_or_else(|_| "-".into());
        let mem = probe
            .peak_memory_bytes(p.pid)
            .map(|b| thousands(b / 1024))
            .unwrap_or_else(|_| "-".into());
        println!("{:>8}  {:<24} {:>12} {:>14}", p.pid, p.name, cpu, mem);
    }

    println!("\n📊 Total: {} matching processes", targets.len());
    Ok(())
}
