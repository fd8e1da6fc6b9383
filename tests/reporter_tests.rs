//! End-to-end tests of the performance reporter against fake probes.
//!
//! Every test drives the public API only: fake process and interface probes,
//! a manual clock and an in-process event channel.

use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use herakles_process_perf::{
    ChannelEventSource, InterfaceAddress, InterfaceCounters, InterfaceHandle,
    InterfaceProbe, JsonLinesEventSource, ManualClock, NetEvent, Pid, ProbeError, ProcessInfo,
    ProcessProbe, ReporterBuilder, ReporterConfig,
};

#[derive(Default)]
struct FakeProcs {
    procs: Mutex<Vec<(ProcessInfo, Duration, u64)>>,
}

impl FakeProcs {
    fn set(&self, pid: Pid, name: &str, cpu: Duration, mem: u64) {
        let mut p = self.procs.lock().unwrap();
        p.retain(|(i, _, _)| i.pid != pid);
        p.push((
            ProcessInfo {
                pid,
                name: name.into(),
            },
            cpu,
            mem,
        ));
    }

    fn remove(&self, pid: Pid) {
        self.procs.lock().unwrap().retain(|(i, _, _)| i.pid != pid);
    }

    fn get(&self, pid: Pid) -> Option<(Duration, u64)> {
        self.procs
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _, _)| i.pid == pid)
            .map(|(_, c, m)| (*c, *m))
    }
}

impl ProcessProbe for FakeProcs {
    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.procs
            .lock()
            .unwrap()
            .iter()
            .map(|(i, _, _)| i.clone())
            .collect()
    }

    fn cpu_time(&self, pid: Pid) -> Result<Duration, ProbeError> {
        self.get(pid).map(|(c, _)| c).ok_or(ProbeError::Exited(pid))
    }

    fn peak_memory_bytes(&self, pid: Pid) -> Result<u64, ProbeError> {
        self.get(pid).map(|(_, m)| m).ok_or(ProbeError::Exited(pid))
    }
}

/// Process probe whose CPU lookup blocks until the test releases it.
struct StallingProcs {
    inner: FakeProcs,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ProcessProbe for StallingProcs {
    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.inner.list_processes()
    }

    fn cpu_time(&self, pid: Pid) -> Result<Duration, ProbeError> {
        let _ = self
            .release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(30));
        self.inner.cpu_time(pid)
    }

    fn peak_memory_bytes(&self, pid: Pid) -> Result<u64, ProbeError> {
        self.inner.peak_memory_bytes(pid)
    }
}

struct FakeIface {
    address: InterfaceAddress,
    counters: Mutex<InterfaceCounters>,
}

impl FakeIface {
    fn new(ip: &str) -> Self {
        Self {
            address: InterfaceAddress {
                name: "eth0".into(),
                address: ip.parse().unwrap(),
            },
            counters: Mutex::new(InterfaceCounters::default()),
        }
    }
}

impl InterfaceProbe for FakeIface {
    fn list_addresses(&self) -> Result<Vec<InterfaceAddress>, ProbeError> {
        Ok(vec![self.address.clone()])
    }

    fn byte_counters(&self, _: &InterfaceHandle) -> Result<InterfaceCounters, ProbeError> {
        Ok(*self.counters.lock().unwrap())
    }
}

fn config(names: &[&str]) -> ReporterConfig {
    ReporterConfig {
        process_names: names.iter().map(|s| s.to_string()).collect(),
        logical_cores: Some(2),
        ..Default::default()
    }
}

async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_rates_follow_events_then_drop_to_zero() {
    let procs = Arc::new(FakeProcs::default());
    procs.set(10, "app", Duration::ZERO, 0);
    procs.set(11, "other", Duration::ZERO, 0);
    let clock = Arc::new(ManualClock::new());
    let (source, tx) = ChannelEventSource::new(64);

    let reporter = ReporterBuilder::new(config(&["app"]))
        .process_probe(procs.clone())
        .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
        .event_source(source)
        .clock(clock.clone())
        .build()
        .unwrap();

    tx.send(NetEvent::send(10, 100_000)).await.unwrap();
    tx.send(NetEvent::send(10, 25_000)).await.unwrap();
    tx.send(NetEvent::receive(10, 250_000)).await.unwrap();
    tx.send(NetEvent::send(11, 999_999)).await.unwrap();
    wait_for(|| {
        let s = reporter.stats();
        s.events_accepted.load(Ordering::Relaxed) + s.events_filtered.load(Ordering::Relaxed) == 4
    })
    .await;
    assert!(reporter.is_network_active());

    clock.advance(Duration::from_secs(1));
    let r = reporter.collect().await;
    assert_eq!(r.process_count, 1);
    assert_eq!(r.process_sent_kb, 125_000 / 1024);
    assert_eq!(r.process_received_kb, 250_000 / 1024);
    // 125_000 B = 1_000_000 bit over one second
    assert_eq!(r.process_upload_kbps, 1000);
    assert_eq!(r.process_download_kbps, 2000);
    assert_eq!(r.elapsed_seconds, 1.0);

    clock.advance(Duration::from_secs(2));
    let r = reporter.collect().await;
    assert_eq!(r.process_sent_kb, 0);
    assert_eq!(r.process_upload_kbps, 0);
    assert_eq!(r.process_download_kbps, 0);
    assert_eq!(r.process_sent_total_kb, 125_000 / 1024);
    assert_eq!(r.elapsed_seconds, 2.0);

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_events_reports_zero_network() {
    let procs = Arc::new(FakeProcs::default());
    procs.set(1, "app", Duration::ZERO, 64 * 1024 * 1024);
    let clock = Arc::new(ManualClock::new());

    let reporter = ReporterBuilder::new(config(&["app"]))
        .process_probe(procs)
        .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
        .clock(clock.clone())
        .build()
        .unwrap();

    clock.advance(Duration::from_secs(1));
    let r = reporter.collect().await;
    assert_eq!(r.process_count, 1);
    assert_eq!(r.process_memory_mb, 64);
    assert_eq!(r.process_sent_kb, 0);
    assert_eq!(r.process_upload_kbps, 0);
    assert_eq!(r.process_received_kb, 0);
    assert_eq!(r.process_download_kbps, 0);
    assert!(!r.network_ingestion_active);

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cpu_scenario_quarter_of_two_cores() {
    let procs = Arc::new(FakeProcs::default());
    procs.set(1, "app", Duration::from_secs(10), 0);
    let clock = Arc::new(ManualClock::new());

    let reporter = ReporterBuilder::new(config(&["app"]))
        .process_probe(procs.clone())
        .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
        .clock(clock.clone())
        .build()
        .unwrap();

    // First cycle only sets the baseline
    let r = reporter.collect().await;
    assert_eq!(r.process_cpu_percent, 0.0);

    procs.set(1, "app", Duration::from_millis(10_500), 0);
    clock.advance(Duration::from_millis(1000));
    let r = reporter.collect().await;
    assert!(
        (r.process_cpu_percent - 25.0).abs() < 1e-6,
        "got {}",
        r.process_cpu_percent
    );

    // The only process exits: usage never goes negative
    procs.remove(1);
    clock.advance(Duration::from_millis(1000));
    let r = reporter.collect().await;
    assert_eq!(r.process_count, 0);
    assert_eq!(r.process_cpu_percent, 0.0);

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unmatched_interface_ip_keeps_network_fields_zero() {
    let procs = Arc::new(FakeProcs::default());
    let iface = Arc::new(FakeIface::new("10.0.0.1"));
    *iface.counters.lock().unwrap() = InterfaceCounters {
        bytes_sent: 1_000_000,
        bytes_received: 2_000_000,
    };
    let clock = Arc::new(ManualClock::new());

    let reporter = ReporterBuilder::new(ReporterConfig {
        network_ip: Some("192.0.2.7".parse().unwrap()),
        ..config(&[])
    })
    .process_probe(procs)
    .interface_probe(iface.clone())
    .clock(clock.clone())
    .build()
    .unwrap();
    assert!(reporter.interface().is_none());

    for _ in 0..3 {
        iface.counters.lock().unwrap().bytes_sent += 50_000;
        clock.advance(Duration::from_secs(1));
        let r = reporter.collect().await;
        assert!(!r.interface_selected);
        assert_eq!(r.network_sent_kb, 0);
        assert_eq!(r.network_received_kb, 0);
        assert_eq!(r.network_upload_kbps, 0);
        assert_eq!(r.network_download_kbps, 0);
    }

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interface_rate_zero_first_then_delta() {
    let iface = Arc::new(FakeIface::new("10.0.0.1"));
    *iface.counters.lock().unwrap() = InterfaceCounters {
        bytes_sent: 5_000,
        bytes_received: 5_000,
    };
    let clock = Arc::new(ManualClock::new());

    let reporter = ReporterBuilder::new(ReporterConfig {
        network_ip: Some("10.0.0.1".parse().unwrap()),
        ..config(&[])
    })
    .process_probe(Arc::new(FakeProcs::default()))
    .interface_probe(iface.clone())
    .clock(clock.clone())
    .build()
    .unwrap();
    assert_eq!(reporter.interface().map(|h| h.name.as_str()), Some("eth0"));

    let r = reporter.collect().await;
    assert!(r.interface_selected);
    assert_eq!(r.network_upload_kbps, 0);
    assert_eq!(r.network_download_kbps, 0);

    *iface.counters.lock().unwrap() = InterfaceCounters {
        bytes_sent: 5_000 + 250_000,
        bytes_received: 1_000,
    };
    clock.advance(Duration::from_secs(2));
    let r = reporter.collect().await;
    // 250_000 B * 8 / 1000 / 2 s
    assert_eq!(r.network_upload_kbps, 1000);
    // Counter went backwards: clamped
    assert_eq!(r.network_download_kbps, 0);
    assert_eq!(r.network_sent_kb, 250_000 / 1024);

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_collect_returns_when_probe_stalls() {
    let (release, rx) = mpsc::channel::<()>();
    let inner = FakeProcs::default();
    inner.set(1, "app", Duration::from_secs(1), 1024 * 1024);
    let procs = Arc::new(StallingProcs {
        inner,
        release: Mutex::new(rx),
    });

    let reporter = ReporterBuilder::new(ReporterConfig {
        sample_timeout: Duration::from_millis(100),
        ..config(&["app"])
    })
    .process_probe(procs)
    .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
    .build()
    .unwrap();

    let started = Instant::now();
    let r = tokio::time::timeout(Duration::from_secs(3), reporter.collect())
        .await
        .expect("collect did not return while a probe was stalled");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(r.sample_timeouts >= 1);
    assert_eq!(r.process_cpu_percent, 0.0);
    assert_eq!(r.process_count, 1);

    // A second cycle finds the CPU sample still busy and still returns
    let r = tokio::time::timeout(Duration::from_secs(3), reporter.collect())
        .await
        .expect("second collect did not return");
    assert_eq!(r.process_cpu_percent, 0.0);
    // The zero is flagged, not reported as a real idle reading
    assert!(r.samples_skipped >= 1);
    assert!(!r.is_complete());
    assert!(reporter.stats().sample_timeouts.load(Ordering::Relaxed) >= 1);

    drop(release);
    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_lines_events_are_attributed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(
        &path,
        "{\"pid\":10,\"size\":2048,\"direction\":\"send\"}\n\
         {\"pid\":10,\"size\":4096,\"direction\":\"receive\"}\n\
         {\"pid\":11,\"size\":8192,\"direction\":\"send\"}\n\
         not json\n",
    )
    .unwrap();

    let procs = Arc::new(FakeProcs::default());
    procs.set(10, "app", Duration::ZERO, 0);
    procs.set(11, "other", Duration::ZERO, 0);
    let clock = Arc::new(ManualClock::new());

    let reporter = ReporterBuilder::new(config(&["app"]))
        .process_probe(procs)
        .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
        .event_source(JsonLinesEventSource::new(&path))
        .clock(clock.clone())
        .build()
        .unwrap();

    wait_for(|| {
        let s = reporter.stats();
        s.events_accepted.load(Ordering::Relaxed) == 2
            && s.events_filtered.load(Ordering::Relaxed) == 1
    })
    .await;

    clock.advance(Duration::from_secs(1));
    let r = reporter.collect().await;
    assert_eq!(r.process_sent_kb, 2);
    assert_eq!(r.process_received_kb, 4);

    reporter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_are_counted_exactly_once() {
    let procs = Arc::new(FakeProcs::default());
    procs.set(10, "app", Duration::ZERO, 0);
    let clock = Arc::new(ManualClock::new());
    let (source, tx) = ChannelEventSource::new(1024);

    let reporter = ReporterBuilder::new(config(&["app"]))
        .process_probe(procs)
        .interface_probe(Arc::new(FakeIface::new("10.0.0.1")))
        .event_source(source)
        .clock(clock.clone())
        .build()
        .unwrap();

    let producer = tokio::spawn(async move {
        for _ in 0..2000 {
            tx.send(NetEvent::send(10, 1024)).await.unwrap();
        }
    });

    let mut sent_kb = 0;
    while !producer.is_finished() {
        clock.advance(Duration::from_millis(10));
        sent_kb += reporter.collect().await.process_sent_kb;
    }
    producer.await.unwrap();
    wait_for(|| reporter.stats().events_accepted.load(Ordering::Relaxed) == 2000).await;

    clock.advance(Duration::from_millis(10));
    let last = reporter.collect().await;
    sent_kb += last.process_sent_kb;

    assert_eq!(sent_kb, 2000);
    assert_eq!(last.process_sent_total_kb, 2000);

    reporter.shutdown().await;
}
