//! Request/reply correlation for GC traffic.
//!
//! - [`FifoCorrelator`]: for reply types that carry no request id. The
//!   oldest waiter for a reply type takes the next reply of that type, which
//!   is only correct while a single request per reply type is in flight.
//!   [`crate::GcBridge`] serializes such requests.
//! - [`KeyedCorrelator`]: the caller names a key (account id, job id) and
//!   replies are routed to the waiter holding that key.
//!
//! Every waiter settles exactly once: by reply, by timeout, or by a global
//! reject when the session drops.

mod fifo;
mod keyed;
mod waiter;

pub use fifo::FifoCorrelator;
pub use keyed::KeyedCorrelator;
pub use waiter::{Reply, RequestContext, Waiter};
