//! Actor handles for communicating with the ingester and dispatcher
//!
//! Handles are cheap to clone and wrap the bounded channel sender of one
//! actor. A full channel suspends the sender until the actor catches up.

use tokio::sync::mpsc;

use super::message::{ClaimedPair, ScanRequest};

/// Capacity of the ingester's scan request queue
pub const INGEST_QUEUE_CAPACITY: usize = 1000;

/// Capacity of the dispatcher's claimed pair queue
pub const DISPATCH_QUEUE_CAPACITY: usize = 1000;

// ============================================================================
// Ingest Handle
// ============================================================================

/// Handle to send scan requests to the ingester
#[derive(Clone, Debug)]
pub struct IngestHandle {
  pub tx: mpsc::Sender<ScanRequest>,
}

impl IngestHandle {
  pub fn new(tx: mpsc::Sender<ScanRequest>) -> Self {
    Self { tx }
  }

  /// Create the ingest queue, returning the handle and the receiving end
  pub fn channel() -> (Self, mpsc::Receiver<ScanRequest>) {
    let (tx, rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);
    (Self::new(tx), rx)
  }

  /// Queue a scan request, waiting for room if the queue is full
  pub async fn send(&self, request: ScanRequest) -> Result<(), SendError> {
    self.tx.send(request).await.map_err(|_| SendError::ActorGone)
  }

  /// Queue a scan request only if there is room right now
  pub fn try_send(&self, request: ScanRequest) -> Result<(), SendError> {
    self.tx.try_send(request).map_err(|e| match e {
      mpsc::error::TrySendError::Full(_) => SendError::Full,
      mpsc::error::TrySendError::Closed(_) => SendError::ActorGone,
    })
  }
}

// ============================================================================
// Dispatch Handle
// ============================================================================

/// Handle to send claimed pairs to the dispatcher
#[derive(Clone, Debug)]
pub struct DispatchHandle {
  pub tx: mpsc::Sender<ClaimedPair>,
}

impl DispatchHandle {
  pub fn new(tx: mpsc::Sender<ClaimedPair>) -> Self {
    Self { tx }
  }

  /// Create the dispatch queue, returning the handle and the receiving end
  pub fn channel() -> (Self, mpsc::Receiver<ClaimedPair>) {
    let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
    (Self::new(tx), rx)
  }

  pub async fn send(&self, pair: ClaimedPair) -> Result<(), SendError> {
    self.tx.send(pair).await.map_err(|_| SendError::ActorGone)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,

  #[error("Actor queue is full")]
  Full,
}
