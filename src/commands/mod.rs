//! CLI command implementations for herakles-process-perf.
//!
//! This module provides implementations for the CLI subcommands:
//! - `processes`: Target process listing
//! - `interfaces`: Network interface listing

pub mod interfaces;
pub mod processes;

// Re-export command functions
pub use interfaces::command_interfaces;
pub use processes::command_processes;
