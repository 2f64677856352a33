use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use flowsentry::config::Config;
use flowsentry::engine::{create_source, spawn_reporter, Pipeline};

#[derive(Parser)]
#[command(name = "flowsentry")]
#[command(author, version, about = "Flow-tracking network intrusion detection sensor")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Live capture interface
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Replay a pcap file instead of capturing live
    #[arg(short, long)]
    pub pcap: Option<PathBuf>,

    /// Export per-packet flow features to this CSV file
    #[arg(long)]
    pub features_csv: Option<PathBuf>,

    /// Write alerts as JSONL to this file
    #[arg(long)]
    pub alerts: Option<PathBuf>,

    /// Suppress alert printing on stdout
    #[arg(long)]
    pub quiet: bool,

    /// Write the default configuration to a file and exit
    #[arg(long)]
    pub write_config: Option<PathBuf>,
}

pub fn run_command(cli: Cli) -> Result<()> {
    if let Some(path) = &cli.write_config {
        Config::default().save(path)?;
        info!(file = %path.display(), "wrote default configuration");
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // CLI options override the config file
    if cli.interface.is_some() {
        config.capture.interface = cli.interface.clone();
    }
    if cli.pcap.is_some() {
        config.capture.pcap_file = cli.pcap.clone();
    }
    if cli.features_csv.is_some() {
        config.output.features_csv = cli.features_csv.clone();
    }
    if cli.alerts.is_some() {
        config.output.alerts_file = cli.alerts.clone();
    }
    if cli.quiet {
        config.output.print_alerts = false;
    }

    let mut source = create_source(&config.capture)?;
    let mut pipeline = Pipeline::from_config(&config)?;

    let stop = pipeline.stop_handle();
    let reporter = spawn_reporter(
        pipeline.stats(),
        Duration::from_secs(config.stats.interval_secs),
        stop.clone(),
    );

    let result = pipeline.run(source.as_mut());

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = reporter.join();

    result
}
