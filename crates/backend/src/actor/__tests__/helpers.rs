//! Test helpers for actor integration tests.
//!
//! Provides `PipelineTestContext`, which manages the ingest, work and
//! definition directories of one pipeline and writes small `/bin/sh`
//! processors into it.

use std::{
  os::unix::fs::PermissionsExt,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use filetime::FileTime;
use sluice_core::{Config, LogConfig};
use tempfile::TempDir;

use crate::{
  actor::{handle::IngestHandle, message::ExecutionRequest},
  domain::{ProcessorId, Provenance},
};

/// Age given to pairs that should pass the default ingest age gate
pub const OLD: Duration = Duration::from_secs(3600);

/// Test context for pipeline integration tests.
pub struct PipelineTestContext {
  /// Keeps every directory alive for the duration of the test
  _root: TempDir,
  pub ingest_dir: PathBuf,
  pub work_dir: PathBuf,
  pub definitions_dir: PathBuf,
  /// Scratch space for invocation logs, outside every scanned directory
  pub scratch_dir: PathBuf,
}

impl PipelineTestContext {
  pub fn new() -> Self {
    let root = TempDir::new().expect("create temp dir");
    let base = root.path().canonicalize().expect("canonicalize temp dir");

    let ctx = Self {
      ingest_dir: base.join("ingest"),
      work_dir: base.join("work"),
      definitions_dir: base.join("processors"),
      scratch_dir: base.join("scratch"),
      _root: root,
    };
    for dir in [&ctx.ingest_dir, &ctx.work_dir, &ctx.definitions_dir, &ctx.scratch_dir] {
      std::fs::create_dir_all(dir).expect("create fixture dir");
    }
    ctx
  }

  /// Daemon configuration pointing at this context's directories.
  pub fn config(&self) -> Config {
    Config {
      ingest_dir: self.ingest_dir.clone(),
      ingest_min_age: Duration::from_secs(300),
      work_dir: self.work_dir.clone(),
      work_age_off: Duration::from_secs(172_800),
      processor_definitions_dir: self.definitions_dir.clone(),
      ingest_interval: Duration::from_secs(1),
      registry_refresh_interval: Duration::from_secs(300),
      log: LogConfig::default(),
    }
  }

  /// Write a processor definition whose script body is `body`.
  ///
  /// Returns the definition directory.
  pub fn add_processor(&self, name: &str, hook: &str, body: &str, pool_size: usize) -> PathBuf {
    let dir = self.definitions_dir.join(name);
    std::fs::create_dir_all(&dir).expect("create definition dir");
    std::fs::write(
      dir.join("config.properties"),
      format!(
        "executable = run.sh\nhook_file = hook.properties\npool_size = {}\n",
        pool_size
      ),
    )
    .expect("write config");
    std::fs::write(dir.join("hook.properties"), hook).expect("write hook");

    let script = dir.join("run.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    dir
  }

  /// Write a processor that appends "<input> <output>" to a log file per run.
  ///
  /// Returns the definition directory and the log path.
  pub fn add_recording_processor(&self, name: &str, hook: &str, pool_size: usize) -> (PathBuf, PathBuf) {
    let log = self.scratch_dir.join(format!("{}.runs", name));
    let body = format!("echo \"$1 $2\" >> \"{}\"", log.display());
    (self.add_processor(name, hook, &body, pool_size), log)
  }

  /// Drop a metadata/data pair into `dir`, both files aged by `age`.
  ///
  /// Returns the metadata path.
  pub fn drop_pair(&self, dir: &Path, name: &str, metadata: &str, age: Duration) -> PathBuf {
    let metadata_path = dir.join(format!("{}.properties", name));
    let data_path = dir.join(name);
    std::fs::write(&data_path, format!("data for {}", name)).expect("write data");
    std::fs::write(&metadata_path, metadata).expect("write metadata");

    let mtime = FileTime::from_system_time(SystemTime::now() - age);
    filetime::set_file_mtime(&data_path, mtime).expect("set data mtime");
    filetime::set_file_mtime(&metadata_path, mtime).expect("set metadata mtime");
    metadata_path
  }

  /// Immediate children of the work directory whose name starts with `prefix`.
  pub fn work_entries(&self, prefix: &str) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.work_dir)
      .expect("read work dir")
      .flatten()
      .map(|e| e.path())
      .filter(|p| {
        p.file_name()
          .map(|n| n.to_string_lossy().starts_with(prefix))
          .unwrap_or(false)
      })
      .collect();
    entries.sort();
    entries
  }

  /// Build an execution request with fresh input/output directories in the work area.
  pub fn execution_request(&self, name: &str, ingest: &IngestHandle, provenance: Provenance) -> ExecutionRequest {
    let input = self.work_dir.join(format!("input-{}", name));
    let output = self.work_dir.join(format!("output-{}", name));
    std::fs::create_dir_all(&input).expect("create input dir");
    std::fs::create_dir_all(&output).expect("create output dir");
    ExecutionRequest {
      input,
      output,
      provenance,
      ingest: ingest.clone(),
    }
  }
}

/// Id the registry assigns to the definition in `dir`.
pub fn processor_id(dir: &Path) -> ProcessorId {
  ProcessorId::from_dir(dir)
}

/// Lines of a file, or nothing if it does not exist yet.
pub fn read_lines(path: &Path) -> Vec<String> {
  std::fs::read_to_string(path)
    .map(|s| s.lines().map(str::to_string).collect())
    .unwrap_or_default()
}

/// Wait for a condition to become true, with timeout.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  let start = std::time::Instant::now();
  let poll_interval = Duration::from_millis(50);

  while start.elapsed() < timeout {
    if check().await {
      return true;
    }
    tokio::time::sleep(poll_interval).await;
  }

  false
}
