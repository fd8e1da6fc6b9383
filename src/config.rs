//! Configuration management for herakles-process-perf.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{AddrParseError, IpAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 5000;

/// Effective configuration of the reporter binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Targets
    /// Process names (or PIDs); empty means all processes
    #[serde(alias = "processes", alias = "process-names")]
    pub process_names: Option<Vec<String>>,
    /// IP address identifying the interface to sample
    #[serde(alias = "network", alias = "network-ip")]
    pub network_ip: Option<String>,

    // Reporting
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    pub csv: Option<bool>,

    // Sampling
    #[serde(alias = "sample-timeout-ms")]
    pub sample_timeout_ms: Option<u64>,
    pub parallelism: Option<usize>,

    // Network events
    #[serde(alias = "events-file")]
    pub events_file: Option<PathBuf>,
    #[serde(alias = "follow-events")]
    pub follow_events: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_names: Some(Vec::new()),
            network_ip: None,
            interval_ms: Some(DEFAULT_INTERVAL_MS),
            csv: Some(false),
            sample_timeout_ms: Some(DEFAULT_SAMPLE_TIMEOUT_MS),
            parallelism: None,
            events_file: None,
            follow_events: Some(false),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS))
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms.unwrap_or(DEFAULT_SAMPLE_TIMEOUT_MS))
    }

    pub fn names(&self) -> Vec<String> {
        self.process_names.clone().unwrap_or_default()
    }

    /// Parsed interface address; validation guarantees it parses.
    pub fn network_addr(&self) -> Result<Option<IpAddr>, AddrParseError> {
        self.network_ip
            .as_deref()
            .map(|s| s.trim().parse())
            .transpose()
    }
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.interval_ms == Some(0) {
        return Err("interval_ms must be greater than 0".into());
    }

    if cfg.sample_timeout_ms == Some(0) {
        return Err("sample_timeout_ms must be greater than 0".into());
    }

    if let Some(ip) = cfg.network_ip.as_deref() {
        if ip.trim().parse::<IpAddr>().is_err() {
            return Err(format!("Invalid network_ip '{}', expected an IPv4 or IPv6 address", ip).into());
        }
    }

    if let Some(names) = &cfg.process_names {
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("process_names must not contain empty names".into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}', expected one of: {}",
                level,
                LOG_LEVELS.join(", ")
            )
            .into());
        }
    }

    if let Some(path) = &cfg.events_file {
        if !path.exists() {
            return Err(format!("events_file not found: {}", path.display()).into());
        }
    }

    Ok(())
}

fn log_level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Off => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if !args.processes.is_empty() {
        config.process_names = Some(args.processes.clone());
    }

    if let Some(ip) = args.network {
        config.network_ip = Some(ip.to_string());
    }

    if let Some(ms) = args.interval {
        config.interval_ms = Some(ms);
    }

    if args.csv {
        config.csv = Some(true);
    }

    if let Some(ms) = args.sample_timeout {
        config.sample_timeout_ms = Some(ms);
    }

    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }

    if let Some(path) = &args.events_file {
        config.events_file = Some(path.clone());
    }
    if args.follow_events {
        config.follow_events = Some(true);
    }

    if let Some(level) = args.log_level {
        config.log_level = Some(log_level_name(level).to_string());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/process-perf.yaml",
            "/etc/herakles/process-perf.yml",
            "/etc/herakles/process-perf.json",
            "./herakles-process-perf.yaml",
            "./herakles-process-perf.yml",
            "./herakles-process-perf.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses config text; the extension picks the format, YAML otherwise.
fn parse_config(content: &str, extension: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let config: Config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
