//! CLI arguments and subcommands for herakles-process-perf.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (git ",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-process-perf",
    about = "Periodic CPU, memory and network report for a set of processes",
    long_about = "Periodic CPU, memory and network report for a set of processes.\n\n\
                  Samples CPU usage, peak memory and per-process network transfer of the named \
                  processes (all processes if none are given) every interval, optionally together \
                  with the throughput of the network interface that owns a given address. \
                  Reports go to stdout as text or CSV; logs go to stderr.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version,
    long_version = LONG_VERSION,
    propagate_version = true,
    subcommand_precedence_over_arg = true,
    after_help = "More info: https://www.herakles.now | Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Process names (or PIDs) to monitor; none means all processes
    #[arg(value_name = "PROCESS")]
    pub processes: Vec<String>,

    /// IP address of the network interface to monitor
    #[arg(short = 'n', long, value_name = "IP")]
    pub network: Option<IpAddr>,

    /// Reporting interval in milliseconds
    #[arg(short = 'i', long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Print CSV instead of text
    #[arg(long)]
    pub csv: bool,

    /// Upper bound for a single sub-sample in milliseconds
    #[arg(long, value_name = "MS")]
    pub sample_timeout: Option<u64>,

    /// Read per-process network events (JSON lines) from this file
    #[arg(long, value_name = "PATH")]
    pub events_file: Option<PathBuf>,

    /// Keep reading the events file as it grows
    #[arg(long)]
    pub follow_events: bool,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Parallel processing threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the processes currently matched by the given names
    Processes {
        /// Process names (or PIDs); overrides the configured names
        #[arg(value_name = "PROCESS")]
        names: Vec<String>,
    },

    /// List network interfaces and their addresses
    Interfaces,

    /// Check runtime requirements and permissions
    CheckRequirements,
}
