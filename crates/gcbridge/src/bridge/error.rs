use std::time::Duration;

use crate::gateway::GatewayError;
use crate::wire::WireError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("request timed out after {}ms", .0.as_millis())]
    RequestTimeout(Duration),

    #[error("game coordinator not ready after {}ms", .0.as_millis())]
    ReadinessTimeout(Duration),

    #[error("game coordinator session lost")]
    SessionLost,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("a request awaiting reply type {0} is already in flight")]
    AlreadyInFlight(u32),

    #[error("a waiter for {0} is already registered")]
    DuplicateKey(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<WireError> for BridgeError {
    fn from(e: WireError) -> Self {
        Self::Protocol(e.to_string())
    }
}
