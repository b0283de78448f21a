//! Daemon lifecycle management.
//!
//! The daemon wires the pipeline actors together and supervises them.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── Scheduler (top-level scans, registry rebuilds, age-off, log retention)
//!   ├── IngestActor
//!   ├── Dispatcher
//!   └── ProcessorRegistry
//!         └── ProcessorPool (per processor definition)
//! ```
//!
//! # Lifecycle
//!
//! 1. Validate config and resolve the work directory to an absolute path
//! 2. Build the registry once (no usable processor is fatal)
//! 3. Create master `CancellationToken`
//! 4. Spawn ingester, dispatcher and scheduler
//! 5. Run until ctrl-c or cancellation
//! 6. Graceful shutdown: cancel the loops, then drain every pool

use std::{path::PathBuf, sync::Arc};

use sluice_core::{Config, ConfigError};
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actor::{
  Dispatcher, IngestActor, ProcessorRegistry, RegistryError, Scheduler, SchedulerConfig,
  handle::{DispatchHandle, IngestHandle},
};

// ============================================================================
// Errors
// ============================================================================

/// Failures that abort startup before any loop runs
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("Failed to resolve {key} {}: {source}", .path.display())]
  Resolve {
    key: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

// ============================================================================
// Daemon
// ============================================================================

/// The sluice daemon - owns every pipeline task.
///
/// # Usage
///
/// ```ignore
/// let daemon = Daemon::start(config).await?;
/// daemon.run().await;
/// ```
pub struct Daemon {
  config: Config,
  registry: Arc<ProcessorRegistry>,
  ingest: IngestHandle,
  cancel: CancellationToken,
  tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
  /// Validate the configuration, build the registry and spawn the pipeline.
  pub async fn start(mut config: Config) -> Result<Self, StartupError> {
    config.validate()?;
    config.work_dir = resolve("work_dir", &config.work_dir).await?;
    config.ingest_dir = resolve("ingest_dir", &config.ingest_dir).await?;

    info!("Starting sluice daemon");
    info!(
      ingest_dir = %config.ingest_dir.display(),
      work_dir = %config.work_dir.display(),
      definitions = %config.processor_definitions_dir.display(),
      "Configured directories"
    );

    let registry = Arc::new(ProcessorRegistry::new(config.processor_definitions_dir.clone()));
    registry.rebuild().await?;

    // Master cancellation token - propagates to all children
    let cancel = CancellationToken::new();

    let (ingest, ingest_rx) = IngestHandle::channel();
    let (dispatch, dispatch_rx) = DispatchHandle::channel();

    let ingester = IngestActor::new(config.work_dir.clone(), ingest_rx, dispatch, cancel.child_token());
    let dispatcher = Dispatcher::new(
      config.work_dir.clone(),
      Arc::clone(&registry),
      ingest.clone(),
      dispatch_rx,
      cancel.child_token(),
    );
    let scheduler = Scheduler::new(
      Arc::clone(&registry),
      ingest.clone(),
      SchedulerConfig::from_config(&config),
    );

    let tasks = vec![
      tokio::spawn(scheduler.run(cancel.child_token())),
      tokio::spawn(ingester.run()),
      tokio::spawn(dispatcher.run()),
    ];

    info!(
      ingest_interval_secs = config.ingest_interval.as_secs(),
      refresh_interval_secs = config.registry_refresh_interval.as_secs(),
      "Pipeline started"
    );

    Ok(Self {
      config,
      registry,
      ingest,
      cancel,
      tasks,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Handle for injecting scan requests directly
  pub fn ingest_handle(&self) -> IngestHandle {
    self.ingest.clone()
  }

  pub fn registry(&self) -> Arc<ProcessorRegistry> {
    Arc::clone(&self.registry)
  }

  /// Token that stops the daemon when cancelled
  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Run until ctrl-c or until the cancel token fires, then shut down.
  pub async fn run(self) {
    let cancel_for_signal = self.cancel.clone();
    tokio::spawn(async move {
      if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        return;
      }
      info!("Received ctrl-c, shutting down...");
      cancel_for_signal.cancel();
    });

    self.cancel.cancelled().await;
    self.shutdown().await;
  }

  /// Stop the loops, then wait for every queued and running request to finish.
  pub async fn shutdown(self) {
    info!("Shutting down...");
    self.cancel.cancel();

    for result in futures::future::join_all(self.tasks).await {
      if let Err(e) = result {
        warn!(error = %e, "Pipeline task failed");
      }
    }

    // Drop our sender so workers finishing late see the ingester as gone
    drop(self.ingest);
    self.registry.shutdown().await;

    info!("Daemon shutdown complete");
  }
}

async fn resolve(key: &'static str, path: &std::path::Path) -> Result<PathBuf, StartupError> {
  tokio::fs::canonicalize(path).await.map_err(|source| StartupError::Resolve {
    key,
    path: path.to_path_buf(),
    source,
  })
}
