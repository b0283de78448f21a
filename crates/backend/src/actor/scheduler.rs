use std::{
  path::PathBuf,
  sync::Arc,
  time::{Duration, SystemTime},
};

use sluice_core::{Config, LOG_FILE_NAME};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
  handle::{IngestHandle, SendError},
  message::ScanRequest,
  registry::ProcessorRegistry,
};
use crate::work_area;

const AGE_OFF_INTERVAL: Duration = Duration::from_secs(3600);
const LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Timer settings for the scheduler, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  pub ingest_dir: PathBuf,
  pub ingest_min_age: Duration,
  pub ingest_interval: Duration,
  pub registry_refresh_interval: Duration,
  pub work_dir: PathBuf,
  /// Zero disables the work-area sweep
  pub work_age_off: Duration,
  pub log_dir: Option<PathBuf>,
  /// Zero keeps log files forever
  pub log_retention_days: u64,
}

impl SchedulerConfig {
  pub fn from_config(config: &Config) -> Self {
    Self {
      ingest_dir: config.ingest_dir.clone(),
      ingest_min_age: config.ingest_min_age,
      ingest_interval: config.ingest_interval,
      registry_refresh_interval: config.registry_refresh_interval,
      work_dir: config.work_dir.clone(),
      work_age_off: config.work_age_off,
      log_dir: config.log.dir.clone(),
      log_retention_days: config.log.retention_days,
    }
  }
}

/// Periodic driver of the pipeline.
///
/// Handles:
/// - Top-level ingest scans
/// - Processor registry rebuilds
/// - Work-area age-off
/// - Log file retention
pub struct Scheduler {
  registry: Arc<ProcessorRegistry>,
  ingest: IngestHandle,
  config: SchedulerConfig,
}

impl Scheduler {
  pub fn new(registry: Arc<ProcessorRegistry>, ingest: IngestHandle, config: SchedulerConfig) -> Self {
    Self {
      registry,
      ingest,
      config,
    }
  }

  /// Run the scheduler until cancelled.
  pub async fn run(self, cancel: CancellationToken) {
    use tokio::time::interval;

    let mut ingest_timer = interval(self.config.ingest_interval);
    let mut refresh_timer = interval(self.config.registry_refresh_interval);
    let mut age_off_timer = interval(AGE_OFF_INTERVAL);
    let mut log_cleanup_timer = interval(LOG_CLEANUP_INTERVAL);

    // The registry was built at startup; the first scan fires immediately
    refresh_timer.tick().await;
    age_off_timer.tick().await;
    log_cleanup_timer.tick().await;

    if self.config.log_retention_days > 0 {
      let deleted = self.cleanup_old_logs();
      if deleted > 0 {
        info!("Cleaned up {} old log files at startup", deleted);
      }
    }

    info!(
      ingest_dir = %self.config.ingest_dir.display(),
      interval_secs = self.config.ingest_interval.as_secs(),
      "Scheduler started"
    );

    loop {
      tokio::select! {
          biased;

          _ = cancel.cancelled() => {
              info!("Scheduler shutting down (cancelled)");
              break;
          }

          _ = ingest_timer.tick() => {
              self.request_top_level_scan();
          }

          _ = refresh_timer.tick() => {
              debug!("Running scheduled registry rebuild");
              if let Err(e) = self.registry.rebuild().await {
                  warn!(error = %e, "Registry rebuild failed, keeping current processors");
              }
          }

          _ = age_off_timer.tick() => {
              if !self.config.work_age_off.is_zero() {
                  let removed = work_area::sweep_older_than(
                      &self.config.work_dir,
                      self.config.work_age_off,
                      SystemTime::now(),
                  )
                  .await;
                  if removed > 0 {
                      info!("Aged off {} work directory entries", removed);
                  }
              }
          }

          _ = log_cleanup_timer.tick() => {
              if self.config.log_retention_days > 0 {
                  let deleted = self.cleanup_old_logs();
                  if deleted > 0 {
                      info!("Cleaned up {} old log files", deleted);
                  }
              }
          }
      }
    }

    info!("Scheduler stopped");
  }

  /// Queue a scan of the top-level ingest directory unless the ingester is backed up.
  fn request_top_level_scan(&self) {
    let request = ScanRequest::top_level(self.config.ingest_dir.clone(), self.config.ingest_min_age);
    match self.ingest.try_send(request) {
      Ok(()) => {}
      Err(SendError::Full) => debug!("Ingest queue full, skipping top-level scan"),
      Err(SendError::ActorGone) => warn!("Ingester has shut down, cannot request top-level scan"),
    }
  }

  /// Cleanup old log files based on retention policy.
  fn cleanup_old_logs(&self) -> usize {
    let Some(log_dir) = &self.config.log_dir else {
      return 0;
    };

    let retention_secs = self.config.log_retention_days * 24 * 3600;
    let now = SystemTime::now();
    let mut deleted = 0;

    let entries = match std::fs::read_dir(log_dir) {
      Ok(e) => e,
      Err(e) => {
        warn!(path = %log_dir.display(), error = %e, "Failed to read log directory");
        return 0;
      }
    };

    for entry in entries.flatten() {
      let path = entry.path();

      if path.is_dir() {
        continue;
      }

      let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        continue;
      };

      // The live file has no date suffix
      if !file_name.starts_with(LOG_FILE_NAME) || file_name == LOG_FILE_NAME {
        continue;
      }

      let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
        continue;
      };

      if work_area::file_age(now, modified).as_secs() > retention_secs {
        if let Err(e) = std::fs::remove_file(&path) {
          warn!(path = %path.display(), error = %e, "Failed to delete old log file");
        } else {
          debug!(path = %path.display(), "Deleted old log file");
          deleted += 1;
        }
      }
    }

    deleted
  }
}
