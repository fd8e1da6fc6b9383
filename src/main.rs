//! herakles-process-perf - version 0.1.0
//!
//! Live CPU, memory and network report for a set of processes, with tracing logging.
//! This is the main entry point that starts the reporting loop and handles subcommands.

mod cli;
mod commands;
mod config;
mod output;
mod startup_checks;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use cli::{Args, Commands};
use commands::{command_interfaces, command_processes};
use config::{resolve_config, show_config, validate_effective_config, Config};
use herakles_process_perf::{
    JsonLinesEventSource, PerformanceReporter, ReporterBuilder, ReporterConfig,
};
use output::OutputFormat;

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr so stdout carries only the reports.
fn setup_logging(config: &Config) {
    let log_level = config
        .log_level
        .as_deref()
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    debug!("Logging initialized with level: {}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds the reporter from the effective configuration.
fn build_reporter(config: &Config) -> anyhow::Result<PerformanceReporter> {
    let reporter_config = ReporterConfig {
        process_names: config.names(),
        network_ip: config.network_addr().context("invalid network_ip")?,
        sample_timeout: config.sample_timeout(),
        logical_cores: None,
    };
    let builder = ReporterBuilder::new(reporter_config);

    let builder = match &config.events_file {
        Some(path) => builder.event_source(
            JsonLinesEventSource::new(path).follow(config.follow_events.unwrap_or(false)),
        ),
        None => {
            info!("No network event source configured - process network metrics stay at zero");
            builder
        }
    };

    builder.build().context("failed to start performance reporter")
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Processes { names } => command_processes(&config, names),
            Commands::Interfaces => command_interfaces(),
            Commands::CheckRequirements => {
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                match startup_checks::validate_requirements(
                    Path::new("/proc"),
                    config.events_file.as_deref(),
                ) {
                    Ok(_) => {
                        println!("\n✅ All requirements met");
                        std::process::exit(0);
                    }
                    Err(e) => {
                        eprintln!("\n❌ Requirements check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        };
    }

    info!("Starting herakles-process-perf");
    startup_checks::log_kernel_version(Path::new("/proc"));

    if let Err(e) =
        startup_checks::validate_requirements(Path::new("/proc"), config.events_file.as_deref())
    {
        error!("❌ Startup validation failed: {}", e);
        error!("   The reporter will start but some metrics may read as zero!");
        // Continue anyway - don't fail hard
    }

    // Configure parallel processing
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    let reporter = build_reporter(&config)?;
    let format = OutputFormat::new(
        &config.names(),
        config.csv.unwrap_or(false),
        config.network_ip.is_some(),
    );
    let interval = config.interval();

    if let Some(header) = format.header() {
        println!("{header}");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let report = reporter.collect().await;
        println!("{}", format.line(&report));
    }

    reporter.shutdown().await;
    info!("herakles-process-perf stopped gracefully");
    Ok(())
}
