//! Herakles Process Performance Library
//!
//! Periodically reports CPU, memory and network usage of a named set of
//! processes, plus the throughput of one network interface.
//!
//! # Features
//!
//! - **Differential CPU sampling**: usage between two samples, normalized to logical cores
//! - **Peak memory**: summed peak working set of the target processes
//! - **Per-process network accounting**: transfer events from a pluggable transport
//! - **Interface throughput**: upload/download rate of the interface owning an address
//! - **Bounded cycles**: a stalled probe never blocks a report
//!
//! # Usage
//!
//! ```no_run
//! use herakles_process_perf::{PerformanceReporter, ReporterConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReporterConfig {
//!     process_names: vec!["nginx".into()],
//!     ..Default::default()
//! };
//! let reporter = PerformanceReporter::builder(config).build()?;
//!
//! tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//! let report = reporter.collect().await;
//! println!("{} processes, {:.2}% CPU", report.process_count, report.process_cpu_percent);
//!
//! reporter.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod counters;
pub mod ingest;
pub mod probe;
pub mod report;
pub mod reporter;
pub mod resolver;
pub mod sampler;
pub mod stats;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use counters::Direction;
pub use ingest::sources::{ChannelClosed, EventSender};
pub use ingest::{
    ChannelEventSource, JsonLinesEventSource, NetEvent, NetEventSource, TransportError,
    UnavailableEventSource,
};
pub use probe::{
    InterfaceAddress, InterfaceCounters, InterfaceHandle, InterfaceProbe, NetDevProbe, Pid,
    ProbeError, ProcessInfo, ProcessProbe, ProcfsProbe,
};
pub use report::Report;
pub use reporter::{PerformanceReporter, ReporterBuilder, ReporterConfig, ReporterError};
pub use resolver::{NameResolver, ProcessResolver, StaticResolver, TargetSet};
pub use stats::SamplerStats;
