//! Domain types - processors, hooks and provenance
//!
//! These types carry no channels or tasks; the actors in [`crate::actor`]
//! move them between the pipeline stages.

pub mod hook;
pub mod processor;
pub mod provenance;

pub use hook::{BasicMatch, Hook, HookError, HookKind};
pub use processor::{DefinitionError, Processor, ProcessorId, RunError};
pub use provenance::Provenance;
