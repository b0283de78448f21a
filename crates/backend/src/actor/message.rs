//! Message types passed between the pipeline stages
//!
//! ```text
//! Scheduler ──ScanRequest──► Ingester ──ClaimedPair──► Dispatcher ──ExecutionRequest──► Pool workers
//!                               ▲                                                          │
//!                               └──────────────────── ScanRequest (output dir) ────────────┘
//! ```

use std::{path::PathBuf, time::Duration};

use super::handle::IngestHandle;
use crate::domain::Provenance;

// ============================================================================
// Ingest Messages
// ============================================================================

/// A request to scan one directory for metadata/data pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
  /// Directory to scan (non-recursive)
  pub dir: PathBuf,
  /// Both files of a pair must be older than this (zero disables the check)
  pub min_age: Duration,
  /// Provenance attached to every pair claimed from this directory
  pub provenance: Provenance,
  /// Remove the directory once no unclaimed pairs remain in it
  pub remove_after_ingest: bool,
}

impl ScanRequest {
  /// Periodic scan of the persistent top-level ingest directory
  pub fn top_level(dir: PathBuf, min_age: Duration) -> Self {
    Self {
      dir,
      min_age,
      provenance: Provenance::new(),
      remove_after_ingest: false,
    }
  }

  /// Immediate scan of a processor's transient output directory
  pub fn stage_output(dir: PathBuf, provenance: Provenance) -> Self {
    Self {
      dir,
      min_age: Duration::ZERO,
      provenance,
      remove_after_ingest: true,
    }
  }
}

// ============================================================================
// Dispatch Messages
// ============================================================================

/// A pair that was moved into a claim directory and awaits routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedPair {
  pub metadata: PathBuf,
  pub data: PathBuf,
  pub provenance: Provenance,
}

// ============================================================================
// Pool Messages
// ============================================================================

/// One processor run: read from `input`, write to `output`
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
  /// Absolute path of the private input directory (removed after a successful run)
  pub input: PathBuf,
  /// Absolute path of the output directory (re-scanned after a successful run)
  pub output: PathBuf,
  /// Processors that already ran on this artifact's lineage
  pub provenance: Provenance,
  /// Where the worker reports its output directory for re-ingestion
  pub ingest: IngestHandle,
}
