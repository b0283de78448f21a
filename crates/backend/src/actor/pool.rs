//! Bounded worker pool for one processor.
//!
//! Each pool owns a bounded request queue and exactly `pool_size` worker
//! tasks. Workers pull from a shared receiver, so at most `pool_size` runs of
//! the processor are in flight at once.
//!
//! Stopping a pool drops its sender. Workers keep draining whatever is
//! already queued and exit once the queue is empty, so no accepted request
//! is lost on reconfiguration or shutdown.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use super::message::{ExecutionRequest, ScanRequest};
use crate::{domain::Processor, work_area};

/// Queued requests per worker slot
pub const QUEUE_SLOTS_PER_WORKER: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
  #[error("Processor pool is closed")]
  Closed,
}

pub struct ProcessorPool {
  processor: Arc<Processor>,
  tx: mpsc::Sender<ExecutionRequest>,
  workers: Vec<JoinHandle<()>>,
}

impl ProcessorPool {
  /// Start the worker tasks for `processor`.
  pub fn spawn(processor: Processor) -> Self {
    let processor = Arc::new(processor);
    let worker_count = processor.pool_size().max(1);
    let (tx, rx) = mpsc::channel(worker_count * QUEUE_SLOTS_PER_WORKER);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let workers = (0..worker_count)
      .map(|worker_id| tokio::spawn(pool_worker(worker_id, Arc::clone(&processor), Arc::clone(&rx))))
      .collect();

    debug!(processor = %processor.name(), id = %processor.id(), workers = worker_count, "Processor pool started");

    Self { processor, tx, workers }
  }

  pub fn processor(&self) -> &Arc<Processor> {
    &self.processor
  }

  /// Queue a request, waiting for room if the queue is full.
  pub async fn submit(&self, request: ExecutionRequest) -> Result<(), PoolError> {
    self.tx.send(request).await.map_err(|_| PoolError::Closed)
  }

  /// Close the queue for new requests.
  ///
  /// The returned future completes once every queued and in-flight request
  /// has finished and all workers have exited.
  pub fn stop(self) -> impl Future<Output = ()> + Send + 'static {
    let Self {
      processor,
      tx,
      workers,
    } = self;
    drop(tx);

    async move {
      for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
          warn!(processor = %processor.name(), error = %e, "Processor worker panicked");
        }
      }
      info!(processor = %processor.name(), id = %processor.id(), "Processor pool drained");
    }
  }
}

/// Pool worker - runs the processor for each request from the shared queue.
async fn pool_worker(
  worker_id: usize,
  processor: Arc<Processor>,
  rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ExecutionRequest>>>,
) {
  trace!(worker_id, processor = %processor.name(), "Pool worker starting");
  let mut processed = 0;

  loop {
    let request = {
      let mut rx_guard = rx.lock().await;
      rx_guard.recv().await
    };

    let Some(request) = request else {
      break;
    };

    execute(&processor, request).await;
    processed += 1;
  }

  trace!(worker_id, processed, processor = %processor.name(), "Pool worker finished");
}

/// Run one request and feed a successful run's output back into the ingester.
///
/// A failed run is logged and abandoned; its input directory stays in the
/// work area until the age-off sweep removes it.
async fn execute(processor: &Processor, request: ExecutionRequest) {
  let ExecutionRequest {
    input,
    output,
    provenance,
    ingest,
  } = request;

  if let Err(e) = processor.run(&input, &output).await {
    warn!(
      processor = %processor.name(),
      input = %input.display(),
      error = %e,
      "Processor run failed, abandoning request"
    );
    return;
  }

  info!(processor = %processor.name(), output = %output.display(), "Processor completed successfully");

  let next = ScanRequest::stage_output(output.clone(), provenance.with(processor.id().clone()));
  if let Err(e) = ingest.send(next).await {
    warn!(
      processor = %processor.name(),
      output = %output.display(),
      error = %e,
      "Could not re-inject output directory"
    );
  }

  if let Err(e) = work_area::remove_tree(&input).await {
    warn!(processor = %processor.name(), error = %e, "Could not remove input directory");
  }
}
