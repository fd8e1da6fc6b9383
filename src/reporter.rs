//! The performance reporter: owns the shared counters, the ingestion task and
//! the sampler, and turns them into one [`Report`] per `collect()` call.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::counters::MetricCounters;
use crate::ingest::{spawn_ingestor, IngestorHandle, NetEventSource, UnavailableEventSource};
use crate::probe::{InterfaceHandle, InterfaceProbe, NetDevProbe, ProcessProbe, ProcfsProbe};
use crate::report::{CycleInfo, Report};
use crate::resolver::{NameResolver, ProcessResolver};
use crate::sampler::{Busy, DifferentialSampler};
use crate::stats::SamplerStats;

/// Default upper bound for a single sub-sample.
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while constructing a reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("a tokio runtime is required to start the reporter")]
    NoRuntime,

    #[error("invalid reporter configuration: {0}")]
    InvalidConfig(String),
}

/// Construction-time settings.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Process names to track; empty tracks every process.
    pub process_names: Vec<String>,
    /// Address used to select the interface to sample.
    pub network_ip: Option<IpAddr>,
    pub sample_timeout: Duration,
    /// Overrides the detected number of logical cores.
    pub logical_cores: Option<usize>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            process_names: Vec::new(),
            network_ip: None,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            logical_cores: None,
        }
    }
}

/// Builds a [`PerformanceReporter`], with the OS-backed probes as defaults.
pub struct ReporterBuilder {
    config: ReporterConfig,
    processes: Option<Arc<dyn ProcessProbe>>,
    interfaces: Option<Arc<dyn InterfaceProbe>>,
    resolver: Option<Arc<dyn ProcessResolver>>,
    events: Option<Box<dyn NetEventSource>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ReporterBuilder {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            processes: None,
            interfaces: None,
            resolver: None,
            events: None,
            clock: None,
        }
    }

    pub fn process_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.processes = Some(probe);
        self
    }

    pub fn interface_probe(mut self, probe: Arc<dyn InterfaceProbe>) -> Self {
        self.interfaces = Some(probe);
        self
    }

    /// Replaces name-based resolution; `process_names` is then ignored.
    pub fn resolver(mut self, resolver: Arc<dyn ProcessResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn event_source(mut self, source: impl NetEventSource) -> Self {
        self.events = Some(Box::new(source));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Selects the interface, starts ingestion and returns the reporter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<PerformanceReporter, ReporterError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ReporterError::NoRuntime);
        }
        if self.config.sample_timeout.is_zero() {
            return Err(ReporterError::InvalidConfig(
                "sample timeout must be greater than zero".into(),
            ));
        }
        if self.config.logical_cores == Some(0) {
            return Err(ReporterError::InvalidConfig(
                "logical core count must be greater than zero".into(),
            ));
        }

        let processes: Arc<dyn ProcessProbe> = self
            .processes
            .unwrap_or_else(|| Arc::new(ProcfsProbe::default()));
        let interfaces: Arc<dyn InterfaceProbe> = self
            .interfaces
            .unwrap_or_else(|| Arc::new(NetDevProbe::default()));
        let resolver: Arc<dyn ProcessResolver> = self.resolver.unwrap_or_else(|| {
            Arc::new(NameResolver::new(
                self.config.process_names.clone(),
                processes.clone(),
            ))
        });
        let events = self.events.unwrap_or_else(|| {
            Box::new(UnavailableEventSource::new("no event transport configured"))
        });
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let logical_cores = self
            .config
            .logical_cores
            .unwrap_or(*crate::probe::LOGICAL_CORES);

        let counters = Arc::new(MetricCounters::new(clock.now()));
        let stats = Arc::new(SamplerStats::new());

        let sampler = Arc::new(DifferentialSampler::new(
            resolver.clone(),
            processes,
            interfaces,
            self.config.network_ip,
            clock.clone(),
            counters.clone(),
            stats.clone(),
            logical_cores,
        ));

        let ingestor = spawn_ingestor(
            events,
            resolver.clone(),
            counters.clone(),
            stats.clone(),
            self.config.sample_timeout,
        );

        info!(
            "✅ Performance reporter started (cores={}, sample_timeout={}ms)",
            logical_cores,
            self.config.sample_timeout.as_millis()
        );

        Ok(PerformanceReporter {
            resolver,
            sampler,
            counters,
            clock,
            stats,
            ingestor,
            sample_timeout: self.config.sample_timeout,
        })
    }
}

/// Outcome of one sub-sample bounded by the sample timeout.
enum Bounded<T> {
    Done(T),
    TimedOut,
    Failed(JoinError),
}

/// Runs blocking work on the blocking pool, giving up after `limit`.
///
/// A timed-out job keeps running in the background; its sampler lock stays
/// held, so later runs of the same kind are skipped until it returns.
async fn bounded<T, F>(limit: Duration, f: F) -> Bounded<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(v)) => Bounded::Done(v),
        Ok(Err(e)) => Bounded::Failed(e),
        Err(_) => Bounded::TimedOut,
    }
}

/// Collects CPU, memory and network metrics for a set of processes.
pub struct PerformanceReporter {
    resolver: Arc<dyn ProcessResolver>,
    sampler: Arc<DifferentialSampler>,
    counters: Arc<MetricCounters>,
    clock: Arc<dyn Clock>,
    stats: Arc<SamplerStats>,
    ingestor: IngestorHandle,
    sample_timeout: Duration,
}

impl PerformanceReporter {
    /// Builder with the OS-backed probes and the given configuration.
    pub fn builder(config: ReporterConfig) -> ReporterBuilder {
        ReporterBuilder::new(config)
    }

    /// Runs one sampling cycle and returns its report.
    ///
    /// Returns within roughly the sample timeout even if a probe never
    /// answers; the stalled part then reads as zero and is counted in
    /// [`Report::sample_timeouts`], or in [`Report::samples_skipped`] on
    /// later cycles while the stalled run is still outstanding.
    pub async fn collect(&self) -> Report {
        let started = Instant::now();
        let limit = self.sample_timeout;

        let (count, memory, cpu, interface) = {
            let resolver = self.resolver.clone();
            let mem = self.sampler.clone();
            let cpu = self.sampler.clone();
            let net = self.sampler.clone();
            tokio::join!(
                bounded(limit, move || Ok::<_, Busy>(resolver.resolve().len())),
                bounded(limit, move || mem.sample_memory()),
                bounded(limit, move || cpu.sample_cpu()),
                bounded(limit, move || net.sample_interface()),
            )
        };

        let mut timeouts = 0u32;
        let mut skipped = 0u32;
        let mut tally = |what: &str, result: Outcome<'_>| match result {
            Outcome::Ok => {}
            Outcome::TimedOut => {
                warn!(
                    "⚠️  {} sample did not finish within {}ms, reporting zero",
                    what,
                    limit.as_millis()
                );
                SamplerStats::inc(&self.stats.sample_timeouts);
                timeouts += 1;
            }
            Outcome::Skipped => {
                warn!("⚠️  {} sample skipped, previous run still stalled", what);
                skipped += 1;
            }
            Outcome::Failed(e) => warn!("{} sample task failed: {}", what, e),
        };
        tally("Process count", outcome(&count));
        tally("Memory", outcome(&memory));
        tally("CPU", outcome(&cpu));
        tally("Interface", outcome(&interface));

        let process_count = match count {
            Bounded::Done(Ok(n)) => n,
            _ => 0,
        };

        let snapshot = self.counters.snapshot_and_reset(self.clock.now());
        let report = Report::from_snapshot(
            &snapshot,
            CycleInfo {
                process_count,
                network_ingestion_active: self.ingestor.is_active(),
                interface_selected: self.sampler.interface().is_some(),
                sample_timeouts: timeouts,
                samples_skipped: skipped,
            },
        );

        SamplerStats::inc(&self.stats.cycles);
        self.stats
            .collect_duration_ms
            .add_sample(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            "Cycle done: processes={} cpu={:.2}% elapsed={:.3}s | {}",
            report.process_count,
            report.process_cpu_percent,
            report.elapsed_seconds,
            self.stats.summary()
        );

        report
    }

    /// Current self-statistics.
    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    /// The interface selected at construction, if any.
    pub fn interface(&self) -> Option<&InterfaceHandle> {
        self.sampler.interface()
    }

    pub fn is_network_active(&self) -> bool {
        self.ingestor.is_active()
    }

    /// Stops ingestion and waits for the background task to end.
    pub async fn shutdown(mut self) {
        self.ingestor.shutdown().await;
        info!("Performance reporter stopped: {}", self.stats.summary());
    }
}

/// How one sub-sample of a cycle ended.
enum Outcome<'a> {
    Ok,
    TimedOut,
    /// The previous run of the same sample had not returned yet.
    Skipped,
    Failed(&'a JoinError),
}

fn outcome<T>(b: &Bounded<Result<T, Busy>>) -> Outcome<'_> {
    match b {
        Bounded::Done(Ok(_)) => Outcome::Ok,
        Bounded::Done(Err(_)) => Outcome::Skipped,
        Bounded::TimedOut => Outcome::TimedOut,
        Bounded::Failed(e) => Outcome::Failed(e),
    }
}
