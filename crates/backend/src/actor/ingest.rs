//! IngestActor - turns scan requests into claimed file pairs
//!
//! The actor processes one scan request at a time, so scans never overlap.
//! For every metadata file in the scanned directory it:
//!
//! 1. Locates the data file (same path without the extension)
//! 2. Checks that both files are older than the request's minimum age
//! 3. Moves both into a fresh claim directory in the work area
//! 4. Sends the claimed pair to the dispatcher
//!
//! Any per-file failure leaves the pair where it is; the next scan of the
//! directory retries it.

use std::{
  path::{Path, PathBuf},
  time::SystemTime,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  handle::DispatchHandle,
  message::{ClaimedPair, ScanRequest},
};
use crate::work_area;

/// What one scan did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
  /// Pairs moved into claim directories and handed to the dispatcher
  pub claimed: usize,
  /// Metadata files left in place for a later scan
  pub skipped: usize,
  /// Whether the scanned directory was removed afterwards
  pub removed_dir: bool,
}

pub struct IngestActor {
  work_dir: PathBuf,
  rx: mpsc::Receiver<ScanRequest>,
  dispatch: DispatchHandle,
  cancel: CancellationToken,
}

impl IngestActor {
  /// Create a new IngestActor
  ///
  /// `work_dir` must be absolute; claim directories are created directly in it.
  pub fn new(
    work_dir: PathBuf,
    rx: mpsc::Receiver<ScanRequest>,
    dispatch: DispatchHandle,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      work_dir,
      rx,
      dispatch,
      cancel,
    }
  }

  /// Main actor loop
  ///
  /// Runs until cancelled or until every ingest handle is dropped. A scan in
  /// progress is finished before the loop exits.
  pub async fn run(mut self) {
    info!(work_dir = %self.work_dir.display(), "IngestActor started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("IngestActor shutting down (cancelled)");
              break;
          }

          request = self.rx.recv() => {
              match request {
                  Some(request) => {
                      self.scan(request).await;
                  }
                  None => {
                      info!("IngestActor shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    info!("IngestActor stopped");
  }

  /// Scan one directory and claim every ready pair in it.
  pub async fn scan(&self, request: ScanRequest) -> ScanSummary {
    let mut summary = ScanSummary::default();

    let metadata_files = match work_area::list_metadata_files(&request.dir).await {
      Ok(files) => files,
      Err(e) => {
        warn!(dir = %request.dir.display(), error = %e, "Failed to list directory for ingest");
        return summary;
      }
    };

    trace!(
      dir = %request.dir.display(),
      candidates = metadata_files.len(),
      provenance = %request.provenance,
      "Scanning directory"
    );

    for metadata in metadata_files {
      match self.ingest_pair(&metadata, &request).await {
        Ok(true) => summary.claimed += 1,
        Ok(false) => summary.skipped += 1,
        Err(Stop) => {
          summary.skipped += 1;
          return summary;
        }
      }
    }

    if request.remove_after_ingest {
      summary.removed_dir = self.remove_if_drained(&request.dir).await;
    }

    if summary.claimed > 0 {
      debug!(
        dir = %request.dir.display(),
        claimed = summary.claimed,
        skipped = summary.skipped,
        "Ingested directory"
      );
    }

    summary
  }

  /// Claim one pair. `Ok(false)` leaves it for a later scan.
  async fn ingest_pair(&self, metadata: &Path, request: &ScanRequest) -> Result<bool, Stop> {
    let data = work_area::data_path_for(metadata);

    let data_modified = match modified(&data).await {
      Ok(time) => time,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(metadata = %metadata.display(), "No corresponding data file, skipping");
        return Ok(false);
      }
      Err(e) => {
        warn!(path = %data.display(), error = %e, "Failed to stat data file, skipping");
        return Ok(false);
      }
    };
    let metadata_modified = match modified(metadata).await {
      Ok(time) => time,
      Err(e) => {
        warn!(path = %metadata.display(), error = %e, "Failed to stat metadata file, skipping");
        return Ok(false);
      }
    };

    let now = SystemTime::now();
    if !work_area::is_old_enough(work_area::file_age(now, metadata_modified), request.min_age)
      || !work_area::is_old_enough(work_area::file_age(now, data_modified), request.min_age)
    {
      trace!(metadata = %metadata.display(), "Pair too young, skipping");
      return Ok(false);
    }

    let claimed = match work_area::claim_pair(&self.work_dir, metadata, &data).await {
      Ok(claimed) => claimed,
      Err(e) => {
        warn!(metadata = %metadata.display(), error = %e, "Failed to claim pair, will retry");
        return Ok(false);
      }
    };

    trace!(claim_dir = %claimed.dir.display(), metadata = %metadata.display(), "Claimed pair");

    let pair = ClaimedPair {
      metadata: claimed.metadata,
      data: claimed.data,
      provenance: request.provenance.clone(),
    };

    if let Err(e) = self.dispatch.send(pair).await {
      warn!(claim_dir = %claimed.dir.display(), error = %e, "Dispatcher gone, stopping scan");
      return Err(Stop);
    }

    Ok(true)
  }

  /// Remove a transient directory once no metadata files remain in it.
  async fn remove_if_drained(&self, dir: &Path) -> bool {
    match work_area::list_metadata_files(dir).await {
      Ok(remaining) if remaining.is_empty() => {}
      Ok(remaining) => {
        debug!(dir = %dir.display(), remaining = remaining.len(), "Keeping directory with unclaimed pairs");
        return false;
      }
      Err(e) => {
        warn!(dir = %dir.display(), error = %e, "Failed to re-list directory before removal");
        return false;
      }
    }

    match work_area::remove_tree(dir).await {
      Ok(()) => {
        trace!(dir = %dir.display(), "Removed drained directory");
        true
      }
      Err(e) => {
        warn!(error = %e, "Failed to remove drained directory");
        false
      }
    }
  }
}

/// The dispatcher is gone; nothing more can be claimed.
struct Stop;

async fn modified(path: &Path) -> std::io::Result<SystemTime> {
  tokio::fs::metadata(path).await?.modified()
}
