//! Startup requirement validation for herakles-process-perf.
//!
//! This module validates that the reporter can read the process and network
//! statistics it samples before the reporting loop starts.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path, events_file: Option<&Path>) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_proc_access(proc_root)?;
    check_netdev_access(proc_root)?;

    if let Some(path) = events_file {
        check_events_file(path)?;
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - peak memory of other users' processes may be unreadable");
        warn!("   Recommendation: Run as root to monitor every process");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that per-process stat and status files of another user's process are readable
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    if !proc_root.join("self").join("stat").exists() {
        error!("❌ {} is not a mounted proc filesystem", proc_root.display());
        return Err(ValidationError::ProcNotMounted(
            proc_root.display().to_string(),
        ));
    }

    // PID 1 (init) belongs to root on every system
    let status = proc_root.join("1").join("status");
    match fs::read_to_string(&status) {
        Ok(content) if content.contains("VmHWM") => {
            info!("✅ /proc access: Can read peak memory of all processes");
            Ok(())
        }
        Ok(_) => {
            warn!(
                "⚠️  {} has no VmHWM line - peak memory of kernel-owned processes reads as zero",
                status.display()
            );
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", status.display());
            error!("   Only processes of the current user will be measured!");
            error!("");
            error!("   Solutions:");
            error!("   1. Run as root");
            error!("   2. Grant capabilities:");
            error!("      setcap cap_dac_read_search,cap_sys_ptrace+ep /path/to/binary");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test /proc access: {}", e);
            Ok(())
        }
    }
}

/// Check that interface counters are available
fn check_netdev_access(proc_root: &Path) -> Result<(), ValidationError> {
    let netdev = proc_root.join("net").join("dev");
    match fs::read_to_string(&netdev) {
        Ok(content) => {
            let interfaces = content.lines().skip(2).count();
            info!("✅ {} readable ({} interfaces)", netdev.display(), interfaces);
            Ok(())
        }
        Err(e) => {
            error!("❌ Cannot read {}: {}", netdev.display(), e);
            Err(ValidationError::NetDevUnreadable(e.to_string()))
        }
    }
}

/// Check that the network event file can be opened
fn check_events_file(path: &Path) -> Result<(), ValidationError> {
    match fs::File::open(path) {
        Ok(_) => {
            info!("✅ Network event file readable: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("❌ Cannot open network event file {}: {}", path.display(), e);
            Err(ValidationError::EventsFileUnreadable(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    }
}

/// Logs the kernel version for support requests.
pub fn log_kernel_version(proc_root: &Path) {
    if let Ok(version) = fs::read_to_string(proc_root.join("version")) {
        debug!("Kernel version: {}", version.lines().next().unwrap_or("unknown"));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("proc filesystem not mounted at {0}")]
    ProcNotMounted(String),

    #[error("Interface counters unreadable: {0}")]
    NetDevUnreadable(String),

    #[error("Network event file unreadable: {0}")]
    EventsFileUnreadable(String),
}
