//! sluice - filesystem pipeline orchestrator
//!
//! Watches an ingest directory for metadata/data file pairs, routes each pair
//! to the processors whose hooks match it and feeds their output back in.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sluice::Daemon;
use sluice_core::Config;
use tracing::info;

mod logging;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(version)]
#[command(about = "Filesystem pipeline orchestrator")]
#[command(after_help = "\
EXAMPLE:
  sluice /etc/sluice/sluice.properties

The configuration file is a properties file with at least:
  ingest_dir, work_dir, processor_definitions_dir")]
struct Cli {
  /// Path to the configuration properties file
  config: PathBuf,
}

#[tokio::main]
async fn main() {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) if !e.use_stderr() => e.exit(),
    Err(e) => {
      let _ = e.print();
      std::process::exit(1);
    }
  };

  if let Err(e) = run(cli).await {
    eprintln!("sluice: {:#}", e);
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = Config::load(&cli.config).with_context(|| format!("invalid configuration {}", cli.config.display()))?;

  let _guard = logging::init_logging(&config.log);
  info!(config = %cli.config.display(), "Starting sluice");

  let daemon = Daemon::start(config).await.context("startup failed")?;
  daemon.run().await;

  info!("sluice stopped");
  Ok(())
}
