//! gcbridge: runs durable tasks against a game coordinator session.
//!
//! Tasks are rows in a [`TaskStore`]. A [`TaskProcessor`] claims them one
//! at a time and hands each to its typed handler, which talks to the
//! coordinator through [`GcBridge`]. The bridge owns session readiness,
//! reconnects and reply correlation; the session itself sits behind a
//! [`SessionGateway`].

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod gateway;
pub mod gc;
pub mod readiness;
pub mod store;
mod sync;
pub mod tasks;
mod telemetry;
pub mod wire;

pub use bridge::{BridgeError, GcBridge, ReplyRoute};
pub use config::BridgeConfig;
pub use correlator::{Reply, RequestContext};
pub use gateway::{GatewayError, GatewayEvent, LoopbackGateway, SessionGateway, SidecarGateway};
pub use gc::{GcHeader, GcMessage};
pub use readiness::{ReadinessCoordinator, ReadinessPhase};
pub use store::{
    MemoryTaskStore, SqliteTaskStore, StoreError, TaskCounts, TaskRecord, TaskStatus, TaskStore,
};
pub use tasks::{TaskError, TaskProcessor, TaskRegistry, TickOutcome, default_registry};
pub use telemetry::init_tracing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
