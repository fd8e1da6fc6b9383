//! Process introspection backed by the /proc filesystem.
//!
//! CPU time comes from `/proc/<pid>/stat` (utime + stime), peak memory from
//! the `VmHWM` line of `/proc/<pid>/status`, and names from `comm` with a
//! fallback to the first `cmdline` argument.

use once_cell::sync::Lazy;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Pid, ProbeError, ProcessInfo, ProcessProbe};

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

fn get_logical_cores() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_NPROCESSORS_ONLN
        unsafe {
            let n = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
            if n > 0 {
                return n as usize;
            }
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Number of online logical processors.
pub static LOGICAL_CORES: Lazy<usize> = Lazy::new(get_logical_cores);

/// [`ProcessProbe`] reading from a procfs mount (normally `/proc`).
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_path(&self, pid: Pid) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn read_pid_file(&self, pid: Pid, file: &str) -> Result<String, ProbeError> {
        let path = self.pid_path(pid).join(file);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            // ESRCH shows up when the task is reaped while the file is open
            ErrorKind::NotFound => ProbeError::Exited(pid),
            _ if e.raw_os_error() == Some(libc::ESRCH) => ProbeError::Exited(pid),
            _ => ProbeError::Io {
                path: path.display().to_string(),
                source: e,
            },
        })
    }
}

impl ProcessProbe for ProcfsProbe {
    fn list_processes(&self) -> Vec<ProcessInfo> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.root.display(), e);
                return out;
            }
        };

        for entry in entries.flatten() {
            let p = entry.path();
            let pid: Pid = match p.file_name().and_then(|s| s.to_str()) {
                Some(name) if name.chars().all(|c| c.is_ascii_digit()) => match name.parse() {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                _ => continue,
            };
            // A process that exits during the scan simply has no name anymore
            if let Some(name) = read_process_name(&p) {
                out.push(ProcessInfo { pid, name });
            }
        }
        out
    }

    fn cpu_time(&self, pid: Pid) -> Result<Duration, ProbeError> {
        let content = self.read_pid_file(pid, "stat")?;
        let ticks = parse_stat_cpu_ticks(&content)?;
        Ok(Duration::from_secs_f64(ticks as f64 / *CLK_TCK))
    }

    fn peak_memory_bytes(&self, pid: Pid) -> Result<u64, ProbeError> {
        let content = self.read_pid_file(pid, "status")?;
        // Kernel threads have no VmHWM line and no user memory
        Ok(parse_status_kb(&content, "VmHWM:").unwrap_or(0) * 1024)
    }
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

/// Returns utime + stime in clock ticks from the content of `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_stat_cpu_ticks(content: &str) -> Result<u64, ProbeError> {
    let rest = content
        .rfind(')')
        .map(|idx| &content[idx + 1..])
        .ok_or_else(|| ProbeError::Parse {
            what: "stat".into(),
            detail: "missing command name".into(),
        })?;

    // After the command: state(0) ppid(1) ... utime(11) stime(12)
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() <= 12 {
        return Err(ProbeError::Parse {
            what: "stat".into(),
            detail: format!("expected at least 13 fields, got {}", fields.len()),
        });
    }

    let parse = |idx: usize| -> Result<u64, ProbeError> {
        fields[idx].parse().map_err(|_| ProbeError::Parse {
            what: "stat".into(),
            detail: format!("non-numeric field '{}'", fields[idx]),
        })
    };

    Ok(parse(11)? + parse(12)?)
}

/// Parses a `Key:   1234 kB` line from `/proc/<pid>/status`.
pub fn parse_status_kb(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix(key))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STAT: &str = "1234 (test_process) S 1 1234 1234 0 -1 4194304 100 0 0 0 1000 500 0 0 20 0 1 0 12345 12345678 1234 18446744073709551615";

    fn fake_proc(root: &Path, pid: Pid, comm: &str, stat: &str, status: &str) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        fs::write(dir.join("stat"), stat).unwrap();
        fs::write(dir.join("status"), status).unwrap();
    }

    #[test]
    fn test_parse_stat_cpu_ticks() {
        assert_eq!(parse_stat_cpu_ticks(STAT).unwrap(), 1500);
    }

    #[test]
    fn test_parse_stat_cpu_ticks_name_with_spaces() {
        let stat = "77 (Web Content (x)) R 1 77 77 0 -1 0 0 0 0 0 30 12 0 0 20 0 1 0 1 1 1";
        assert_eq!(parse_stat_cpu_ticks(stat).unwrap(), 42);
    }

    #[test]
    fn test_parse_stat_cpu_ticks_invalid() {
        assert!(parse_stat_cpu_ticks("1234 (test) S 1 2 3").is_err());
        assert!(parse_stat_cpu_ticks("garbage").is_err());
    }

    #[test]
    fn test_parse_status_kb() {
        let status = "Name:\tnginx\nVmPeak:\t  20000 kB\nVmHWM:\t   8192 kB\nVmRSS:\t 4096 kB\n";
        assert_eq!(parse_status_kb(status, "VmHWM:"), Some(8192));
        assert_eq!(parse_status_kb(status, "VmSwap:"), None);
    }

    #[test]
    fn test_procfs_probe_reads_fake_tree() {
        let dir = tempdir().expect("Failed to create temp dir");
        fake_proc(dir.path(), 10, "nginx", STAT, "VmHWM:\t 2048 kB\n");
        fake_proc(dir.path(), 11, "kworker/0:1", STAT, "Name:\tkworker\n");
        fs::create_dir_all(dir.path().join("self")).unwrap();

        let probe = ProcfsProbe::new(dir.path());

        let mut procs = probe.list_processes();
        procs.sort_by_key(|p| p.pid);
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].name, "nginx");

        assert_eq!(probe.peak_memory_bytes(10).unwrap(), 2048 * 1024);
        assert_eq!(probe.peak_memory_bytes(11).unwrap(), 0);

        let expected = 1500.0 / *CLK_TCK;
        let actual = probe.cpu_time(10).unwrap().as_secs_f64();
        assert!((actual - expected).abs() < 0.001);
    }

    #[test]
    fn test_procfs_probe_missing_pid_is_exited() {
        let dir = tempdir().expect("Failed to create temp dir");
        let probe = ProcfsProbe::new(dir.path());

        assert!(probe.cpu_time(999).unwrap_err().is_exited());
        assert!(probe.peak_memory_bytes(999).unwrap_err().is_exited());
    }

    #[test]
    fn test_read_process_name_falls_back_to_cmdline() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("cmdline"), b"/usr/bin/postgres\0-D\0/data\0").unwrap();
        assert_eq!(read_process_name(dir.path()).as_deref(), Some("postgres"));
    }

    #[test]
    fn test_logical_cores_positive() {
        assert!(*LOGICAL_CORES >= 1);
    }
}
