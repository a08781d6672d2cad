use crate::wire::WireError;

/// Pulls correlation keys (typically account ids) out of a reply body.
///
/// A reply may answer several keyed waiters at once, hence the `Vec`.
pub type KeyExtractor = fn(&[u8]) -> Result<Vec<u64>, WireError>;

/// How replies of one GC message type find their waiter.
#[derive(Debug, Clone, Copy)]
pub enum ReplyRoute {
    /// Oldest waiter for the type wins.
    Fifo,
    /// Waiter registered under `(msg_type, key)` for each extracted key.
    Keyed(KeyExtractor),
}

impl ReplyRoute {
    pub fn is_fifo(&self) -> bool {
        matches!(self, Self::Fifo)
    }

    /// Two routes for one message type can coexist only if both are FIFO.
    pub fn compatible_with(&self, other: &ReplyRoute) -> bool {
        self.is_fifo() && other.is_fifo()
    }
}
