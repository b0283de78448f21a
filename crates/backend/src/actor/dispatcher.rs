//! Dispatcher - routes claimed pairs to matching processor pools
//!
//! For every claimed pair the dispatcher loads its metadata, asks the
//! registry which processors match, skips the ones already in the pair's
//! provenance and fans out one [`ExecutionRequest`] per remaining match.
//!
//! Each fan-out target gets its own input directory holding a copy of the
//! pair, its own output directory and its own copy of the provenance list.
//! A failure for one target never affects the others.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use sluice_core::Properties;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  handle::IngestHandle,
  message::{ClaimedPair, ExecutionRequest},
  registry::{ProcessorRegistry, RegistryError},
};
use crate::{
  domain::ProcessorId,
  work_area::{self, Purpose, WorkAreaError},
};

/// What dispatching one pair did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
  /// Execution requests queued on a pool
  pub submitted: usize,
  /// Matches skipped because the processor already ran on this lineage
  pub skipped: usize,
  /// Matches abandoned because of an I/O or routing failure
  pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum TargetError {
  #[error(transparent)]
  WorkArea(#[from] WorkAreaError),

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

pub struct Dispatcher {
  work_dir: PathBuf,
  registry: Arc<ProcessorRegistry>,
  ingest: IngestHandle,
  rx: mpsc::Receiver<ClaimedPair>,
  cancel: CancellationToken,
}

impl Dispatcher {
  /// Create a new Dispatcher
  ///
  /// `work_dir` must be absolute so that processors receive absolute paths.
  pub fn new(
    work_dir: PathBuf,
    registry: Arc<ProcessorRegistry>,
    ingest: IngestHandle,
    rx: mpsc::Receiver<ClaimedPair>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      work_dir,
      registry,
      ingest,
      rx,
      cancel,
    }
  }

  /// Main dispatch loop
  ///
  /// Runs until cancelled or until every dispatch handle is dropped. The pair
  /// being dispatched when cancellation arrives is finished first.
  pub async fn run(mut self) {
    info!("Dispatcher started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => {
              info!("Dispatcher shutting down (cancelled)");
              break;
          }

          pair = self.rx.recv() => {
              match pair {
                  Some(pair) => {
                      self.dispatch(pair).await;
                  }
                  None => {
                      info!("Dispatcher shutting down (channel closed)");
                      break;
                  }
              }
          }
      }
    }

    info!("Dispatcher stopped");
  }

  /// Route one claimed pair to every matching processor it has not been through.
  pub async fn dispatch(&self, pair: ClaimedPair) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    let content = match tokio::fs::read_to_string(&pair.metadata).await {
      Ok(content) => content,
      Err(e) => {
        warn!(metadata = %pair.metadata.display(), error = %e, "Failed to read metadata, dropping pair");
        return summary;
      }
    };
    let properties = match Properties::parse_in(&pair.metadata, &content) {
      Ok(properties) => properties,
      Err(e) => {
        warn!(error = %e, "Malformed metadata, dropping pair");
        return summary;
      }
    };

    let matches = self.registry.matching_ids(&properties).await;
    if matches.is_empty() {
      debug!(metadata = %pair.metadata.display(), "No processor matches pair");
      return summary;
    }

    for id in matches {
      if pair.provenance.contains(&id) {
        debug!(
          processor = %id,
          metadata = %pair.metadata.display(),
          "Processor already ran on this artifact, skipping"
        );
        summary.skipped += 1;
        continue;
      }

      match self.dispatch_to(&id, &pair).await {
        Ok(()) => summary.submitted += 1,
        Err(e) => {
          warn!(processor = %id, metadata = %pair.metadata.display(), error = %e, "Failed to dispatch pair");
          summary.failed += 1;
        }
      }
    }

    summary
  }

  /// Prepare private input/output directories for one target and submit it.
  ///
  /// On failure both directories are removed again.
  async fn dispatch_to(&self, id: &ProcessorId, pair: &ClaimedPair) -> Result<(), TargetError> {
    let input = work_area::create_unique_dir(&self.work_dir, Purpose::Input).await?;
    let output = match work_area::create_unique_dir(&self.work_dir, Purpose::Output).await {
      Ok(output) => output,
      Err(e) => {
        discard(&input).await;
        return Err(e.into());
      }
    };

    let result = self.submit(id, pair, input.clone(), output.clone()).await;
    if result.is_err() {
      discard(&input).await;
      discard(&output).await;
    }
    result
  }

  async fn submit(
    &self,
    id: &ProcessorId,
    pair: &ClaimedPair,
    input: PathBuf,
    output: PathBuf,
  ) -> Result<(), TargetError> {
    work_area::copy_into(&pair.metadata, &input).await?;
    work_area::copy_into(&pair.data, &input).await?;

    let request = ExecutionRequest {
      input,
      output,
      provenance: pair.provenance.clone(),
      ingest: self.ingest.clone(),
    };

    trace!(processor = %id, input = %request.input.display(), "Submitting execution request");
    self.registry.submit(id, request).await?;
    Ok(())
  }
}

async fn discard(dir: &Path) {
  if let Err(e) = work_area::remove_tree(dir).await {
    warn!(error = %e, "Failed to clean up work directory");
  }
}
