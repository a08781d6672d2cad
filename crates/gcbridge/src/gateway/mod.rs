//! Session gateway: the boundary between the bridge and whatever holds the
//! authenticated game client session.
//!
//! Outbound calls go through [`SessionGateway`]. Inbound traffic arrives as
//! [`GatewayEvent`]s on an mpsc channel consumed by
//! [`crate::GcBridge::run_event_loop`].

pub mod codec;
mod loopback;
pub mod protocol;
mod sidecar;

use async_trait::async_trait;
use tokio_util::bytes::Bytes;

use crate::gc::GcHeader;

pub use loopback::{LoopbackGateway, SentMessage};
pub use sidecar::SidecarGateway;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway is not connected")]
    NotConnected,

    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("failed to send to gateway: {0}")]
    Send(String),
}

/// Something that can push raw GC traffic into a live client session.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn send_raw(
        &self,
        app_id: u32,
        msg_type: u32,
        header: GcHeader,
        payload: Bytes,
    ) -> Result<(), GatewayError>;

    /// Mark the app as running so the coordinator accepts traffic for it.
    async fn set_app_active(&self, app_id: u32) -> Result<(), GatewayError>;

    /// Start a (re)login. Completion is reported as
    /// [`GatewayEvent::SessionEstablished`] or [`GatewayEvent::SessionLost`].
    async fn log_on(&self) -> Result<(), GatewayError>;
}

/// Inbound session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    SessionEstablished,
    MessageReceived {
        app_id: u32,
        msg_type: u32,
        header: GcHeader,
        payload: Bytes,
    },
    SessionLost {
        reason: String,
    },
    AppActiveConfirmed {
        app_id: u32,
    },
    AppInactive {
        app_id: u32,
    },
}

impl GatewayEvent {
    pub fn message(app_id: u32, msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self::MessageReceived {
            app_id,
            msg_type,
            header: GcHeader::default(),
            payload: payload.into(),
        }
    }

    pub fn job_reply(app_id: u32, msg_type: u32, job_id: u64, payload: impl Into<Bytes>) -> Self {
        Self::MessageReceived {
            app_id,
            msg_type,
            header: GcHeader::reply_to(job_id),
            payload: payload.into(),
        }
    }
}
