//! Actor-based pipeline stages
//!
//! Each stage runs as a long-lived task and talks to the next one over a
//! bounded `mpsc` channel. A full channel suspends the sender, so a slow
//! stage applies back-pressure to everything upstream of it.
//!
//! # Actors
//!
//! - [`IngestActor`]: claims ready file pairs from scanned directories
//! - [`Dispatcher`]: routes claimed pairs to matching processors
//! - [`ProcessorPool`]: runs one processor with a fixed number of workers
//! - [`ProcessorRegistry`]: owns the current pool set and swaps it on rebuild
//! - [`Scheduler`]: periodic scans, rebuilds and clean-up
//!
//! # Pipeline
//!
//! ```text
//! Scheduler → Ingester → Dispatcher → Pool workers
//!               1000       1000       100 × pool_size
//!                ▲                          │
//!                └──── output directory ────┘
//! ```

pub mod dispatcher;
pub mod handle;
pub mod ingest;
pub mod message;
pub mod pool;
pub mod registry;
pub mod scheduler;


pub use dispatcher::{DispatchSummary, Dispatcher};
pub use ingest::{IngestActor, ScanSummary};
pub use pool::{PoolError, ProcessorPool};
pub use registry::{ProcessorRegistry, RebuildSummary, RegistryError};
pub use scheduler::{Scheduler, SchedulerConfig};
