//! Durable GC tasks: typed handlers, their registry and the processor that
//! drives them from the task store.

pub mod catalog;
mod error;
mod processor;
mod registry;

pub use catalog::default_registry;
pub use error::{RegistryError, TaskError};
pub use processor::{TaskProcessor, TickOutcome};
pub use registry::{DynHandler, Handler, TaskContext, TaskKind, TaskRegistry, TypedHandler};
