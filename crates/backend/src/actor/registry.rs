//! ProcessorRegistry - owns the hot-swappable set of processor pools
//!
//! The registry discovers processor definitions, builds one [`ProcessorPool`]
//! per definition and routes work to them by id. Callers never see a pool
//! directly: they ask for matching ids and submit by id, so a rebuild that
//! swaps every pool is invisible to them except through the submit-time
//! lookup.
//!
//! # Locking
//!
//! - Discovery and pool construction happen outside the lock
//! - The write lock covers only the swap and closing the outgoing pools
//! - `matching_ids` and `submit` take the read lock; `submit` holds it while
//!   waiting for room in a full pool queue, which delays a pending rebuild

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use sluice_core::Properties;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
  message::ExecutionRequest,
  pool::{PoolError, ProcessorPool},
};
use crate::domain::{Processor, ProcessorId};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  #[error("Failed to list processor definitions in {}: {source}", .path.display())]
  ReadDefinitions {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("No usable processor definitions found in {}", .0.display())]
  NoProcessors(PathBuf),

  #[error("No such processor: {0}")]
  NoSuchProcessor(ProcessorId),

  #[error("Processor {id} rejected the request: {source}")]
  Pool {
    id: ProcessorId,
    #[source]
    source: PoolError,
  },
}

/// Outcome of a successful rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
  /// Definitions loaded into the new pool set
  pub loaded: usize,
  /// Definitions rejected as malformed
  pub rejected: usize,
  /// Pools closed from the previous set
  pub retired: usize,
}

// ============================================================================
// ProcessorRegistry
// ============================================================================

#[derive(Default)]
struct RegistryState {
  pools: HashMap<ProcessorId, ProcessorPool>,
  /// Retired pools still working through their queues
  draining: Vec<JoinHandle<()>>,
}

pub struct ProcessorRegistry {
  definitions_dir: PathBuf,
  state: RwLock<RegistryState>,
}

impl ProcessorRegistry {
  /// Create an empty registry; call [`ProcessorRegistry::rebuild`] to load pools.
  pub fn new(definitions_dir: PathBuf) -> Self {
    Self {
      definitions_dir,
      state: RwLock::new(RegistryState::default()),
    }
  }

  pub fn definitions_dir(&self) -> &Path {
    &self.definitions_dir
  }

  /// Rescan the definitions directory and replace the whole pool set.
  ///
  /// When no usable definition is found the current set is kept and an error
  /// is returned.
  pub async fn rebuild(&self) -> Result<RebuildSummary, RegistryError> {
    let (processors, rejected) = discover(&self.definitions_dir).await?;
    if processors.is_empty() {
      return Err(RegistryError::NoProcessors(self.definitions_dir.clone()));
    }

    let loaded = processors.len();
    let pools: HashMap<_, _> = processors
      .into_iter()
      .map(|processor| (processor.id().clone(), ProcessorPool::spawn(processor)))
      .collect();

    let retired = {
      let mut state = self.state.write().await;
      let outgoing = std::mem::replace(&mut state.pools, pools);
      let retired = outgoing.len();

      state.draining.retain(|handle| !handle.is_finished());
      for (_, pool) in outgoing {
        state.draining.push(tokio::spawn(pool.stop()));
      }
      retired
    };

    info!(
      dir = %self.definitions_dir.display(),
      loaded,
      rejected,
      retired,
      "Processor registry rebuilt"
    );

    Ok(RebuildSummary {
      loaded,
      rejected,
      retired,
    })
  }

  /// Ids of every processor whose hook matches `properties`, sorted.
  pub async fn matching_ids(&self, properties: &Properties) -> Vec<ProcessorId> {
    let state = self.state.read().await;
    let mut ids: Vec<ProcessorId> = state
      .pools
      .iter()
      .filter(|(_, pool)| pool.processor().matches(properties))
      .map(|(id, _)| id.clone())
      .collect();
    ids.sort();
    ids
  }

  /// Queue a request on the pool currently registered under `id`.
  pub async fn submit(&self, id: &ProcessorId, request: ExecutionRequest) -> Result<(), RegistryError> {
    let state = self.state.read().await;
    let pool = state
      .pools
      .get(id)
      .ok_or_else(|| RegistryError::NoSuchProcessor(id.clone()))?;

    pool.submit(request).await.map_err(|source| RegistryError::Pool {
      id: id.clone(),
      source,
    })
  }

  /// Ids of the current pool set, sorted.
  pub async fn processor_ids(&self) -> Vec<ProcessorId> {
    let state = self.state.read().await;
    let mut ids: Vec<ProcessorId> = state.pools.keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Display name of a registered processor.
  pub async fn processor_name(&self, id: &ProcessorId) -> Option<String> {
    let state = self.state.read().await;
    state.pools.get(id).map(|pool| pool.processor().name().to_string())
  }

  /// Close every pool and wait until all queued and in-flight requests finish.
  pub async fn shutdown(&self) {
    let drains = {
      let mut state = self.state.write().await;
      let mut drains = std::mem::take(&mut state.draining);
      for (_, pool) in state.pools.drain() {
        drains.push(tokio::spawn(pool.stop()));
      }
      drains
    };

    if drains.is_empty() {
      return;
    }

    info!(count = drains.len(), "Waiting for processor pools to drain");
    for result in futures::future::join_all(drains).await {
      if let Err(e) = result {
        warn!(error = %e, "Processor pool drain task failed");
      }
    }
    info!("All processor pools drained");
  }
}

/// Load every definition directly under `dir`.
///
/// Returns the usable processors and the number of rejected definitions.
/// Non-directory entries are ignored.
pub async fn discover(dir: &Path) -> Result<(Vec<Processor>, usize), RegistryError> {
  let read_err = |source: std::io::Error| RegistryError::ReadDefinitions {
    path: dir.to_path_buf(),
    source,
  };

  let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
  let mut candidates = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
    let path = entry.path();
    if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
      candidates.push(path);
    }
  }
  candidates.sort();

  let mut processors = Vec::new();
  let mut rejected = 0;
  for path in candidates {
    match Processor::load(&path).await {
      Ok(processor) => {
        debug!(
          path = %path.display(),
          processor = %processor.name(),
          id = %processor.id(),
          pool_size = processor.pool_size(),
          "Loaded processor definition"
        );
        processors.push(processor);
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Rejected processor definition");
        rejected += 1;
      }
    }
  }

  Ok((processors, rejected))
}
