//! Text and CSV rendering of reports.

use herakles_process_perf::Report;

const CSV_HEADER: &str = "Process Name(s),Processes(s),CPU (%),Memory (MB),\
Process Sent (KB),Process Upload Speed (kbps),Process Received (KB),Process Download Speed (kbps)";
const CSV_NETWORK_HEADER: &str = ",Network Sent (KB),Network Upload Speed (kbps),\
Network Received (KB),Network Download Speed (kbps)";

/// How reports are printed.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    /// Display label of the monitored processes
    pub label: String,
    pub csv: bool,
    /// Whether interface columns are printed
    pub network: bool,
}

impl OutputFormat {
    pub fn new(names: &[String], csv: bool, network: bool) -> Self {
        Self {
            label: process_label(names),
            csv,
            network,
        }
    }

    /// CSV header line, or `None` in text mode.
    pub fn header(&self) -> Option<String> {
        if !self.csv {
            return None;
        }
        let mut h = CSV_HEADER.to_string();
        if self.network {
            h.push_str(CSV_NETWORK_HEADER);
        }
        Some(h)
    }

    pub fn line(&self, r: &Report) -> String {
        if self.csv {
            self.csv_line(r)
        } else {
            self.text_line(r)
        }
    }

    fn csv_line(&self, r: &Report) -> String {
        let mut line = format!(
            "{},{},{},{},{},{},{},{}",
            self.label,
            r.process_count,
            percent(r.process_cpu_percent),
            r.process_memory_mb,
            r.process_sent_kb,
            r.process_upload_kbps,
            r.process_received_kb,
            r.process_download_kbps,
        );
        if self.network {
            line.push_str(&format!(
                ",{},{},{},{}",
                r.network_sent_kb,
                r.network_upload_kbps,
                r.network_received_kb,
                r.network_download_kbps,
            ));
        }
        line
    }

    fn text_line(&self, r: &Report) -> String {
        // A zero count from a stalled resolution says nothing about the targets
        if r.process_count == 0 && r.is_complete() {
            return format!("No \"{}\" process is running.", self.label);
        }

        let count = if r.process_count == 1 {
            String::new()
        } else {
            format!("({} processes):", thousands(r.process_count as u64))
        };

        let mut line = format!(
            "{} {} CPU: {} | Memory: {} MB | Process: Sent {} KB ({} kbps) - Received {} KB ({} kbps)",
            self.label,
            count,
            percent(r.process_cpu_percent),
            thousands(r.process_memory_mb),
            thousands(r.process_sent_kb),
            thousands(r.process_upload_kbps),
            thousands(r.process_received_kb),
            thousands(r.process_download_kbps),
        );
        if self.network {
            line.push_str(&format!(
                " | Network: Sent {} KB ({} kbps) - Received {} KB ({} kbps)",
                thousands(r.network_sent_kb),
                thousands(r.network_upload_kbps),
                thousands(r.network_received_kb),
                thousands(r.network_download_kbps),
            ));
        }
        if !r.is_complete() {
            line.push_str(&format!(
                " | Incomplete: {} timed out, {} skipped",
                r.sample_timeouts, r.samples_skipped
            ));
        }
        line
    }
}

/// Names joined with `+`; `all` when no names were given.
pub fn process_label(names: &[String]) -> String {
    if names.is_empty() {
        "all".to_string()
    } else {
        names.join("+")
    }
}

/// Integer with `,` every three digits.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Percentage with two decimals and grouped integer part, e.g. `1,234.50%`.
pub fn percent(p: f64) -> String {
    let p = if p.is_finite() { p.max(0.0) } else { 0.0 };
    let fixed = format!("{:.2}", p);
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let int: u64 = int.parse().unwrap_or(0);
    format!("{}.{}%", thousands(int), frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(count: usize) -> Report {
        Report {
            process_count: count,
            process_cpu_percent: 25.0,
            process_memory_mb: 1536,
            process_sent_kb: 12_345,
            process_received_kb: 2,
            process_sent_total_kb: 20_000,
            process_received_total_kb: 10,
            process_upload_kbps: 1000,
            process_download_kbps: 8,
            network_sent_kb: 5,
            network_received_kb: 6,
            network_upload_kbps: 7,
            network_download_kbps: 8,
            elapsed_seconds: 1.0,
            network_ingestion_active: true,
            interface_selected: true,
            sample_timeouts: 0,
            samples_skipped: 0,
        }
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(25.0), "25.00%");
        assert_eq!(percent(3.14159), "3.14%");
        assert_eq!(percent(1234.5), "1,234.50%");
        assert_eq!(percent(f64::NAN), "0.00%");
    }

    #[test]
    fn test_label() {
        assert_eq!(process_label(&[]), "all");
        assert_eq!(process_label(&["a".into(), "b".into()]), "a+b");
    }

    #[test]
    fn test_csv_output() {
        let f = OutputFormat::new(&["nginx".into()], true, false);
        assert_eq!(f.header().unwrap(), CSV_HEADER);
        assert_eq!(f.line(&report(3)), "nginx,3,25.00%,1536,12345,1000,2,8");

        let f = OutputFormat::new(&["nginx".into()], true, true);
        assert!(f.header().unwrap().ends_with("Network Download Speed (kbps)"));
        assert_eq!(f.line(&report(3)), "nginx,3,25.00%,1536,12345,1000,2,8,5,7,6,8");
    }

    #[test]
    fn test_text_output() {
        let f = OutputFormat::new(&["nginx".into(), "php".into()], false, false);
        assert!(f.header().is_none());
        assert_eq!(
            f.line(&report(3)),
            "nginx+php (3 processes): CPU: 25.00% | Memory: 1,536 MB | Process: Sent 12,345 KB (1,000 kbps) - Received 2 KB (8 kbps)"
        );
        assert_eq!(f.line(&report(0)), "No \"nginx+php\" process is running.");
    }

    #[test]
    fn test_text_output_single_process_with_network() {
        let f = OutputFormat::new(&[], false, true);
        let line = f.line(&report(1));
        assert!(line.starts_with("all  CPU: 25.00%"));
        assert!(line.ends_with("| Network: Sent 5 KB (7 kbps) - Received 6 KB (8 kbps)"));
    }

    #[test]
    fn test_text_output_flags_stalled_count() {
        let f = OutputFormat::new(&["nginx".into()], false, false);
        let r = Report {
            sample_timeouts: 1,
            ..report(0)
        };
        let line = f.line(&r);
        assert!(line.starts_with("nginx (0 processes): CPU: 25.00%"), "{line}");
        assert!(line.ends_with("| Incomplete: 1 timed out, 0 skipped"));
    }
}
