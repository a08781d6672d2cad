//! Sidecar wire protocol.
//!
//! The sidecar owns the authenticated client session and relays GC traffic
//! over a local socket. GC bodies travel base64-encoded inside JSON frames.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio_util::bytes::Bytes;

use super::GatewayEvent;
use crate::gc::GcHeader;

/// Bridge to sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarRequest {
    SendRaw {
        app_id: u32,
        msg_type: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id_source: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id_target: Option<u64>,
        payload: String,
    },
    SetAppActive {
        app_id: u32,
    },
    LogOn,
}

impl SidecarRequest {
    pub fn send_raw(app_id: u32, msg_type: u32, header: GcHeader, payload: &[u8]) -> Self {
        Self::SendRaw {
            app_id,
            msg_type,
            job_id_source: header.job_id_source,
            job_id_target: header.job_id_target,
            payload: BASE64.encode(payload),
        }
    }
}

/// Sidecar to bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarEvent {
    SessionEstablished,
    Message {
        app_id: u32,
        msg_type: u32,
        #[serde(default)]
        job_id_source: Option<u64>,
        #[serde(default)]
        job_id_target: Option<u64>,
        payload: String,
    },
    SessionLost {
        reason: String,
    },
    AppActive {
        app_id: u32,
    },
    AppInactive {
        app_id: u32,
    },
}

impl TryFrom<SidecarEvent> for GatewayEvent {
    type Error = base64::DecodeError;

    fn try_from(event: SidecarEvent) -> Result<Self, Self::Error> {
        Ok(match event {
            SidecarEvent::SessionEstablished => GatewayEvent::SessionEstablished,
            SidecarEvent::Message {
                app_id,
                msg_type,
                job_id_source,
                job_id_target,
                payload,
            } => GatewayEvent::MessageReceived {
                app_id,
                msg_type,
                header: GcHeader {
                    job_id_source,
                    job_id_target,
                },
                payload: Bytes::from(BASE64.decode(payload)?),
            },
            SidecarEvent::SessionLost { reason } => GatewayEvent::SessionLost { reason },
            SidecarEvent::AppActive { app_id } => GatewayEvent::AppActiveConfirmed { app_id },
            SidecarEvent::AppInactive { app_id } => GatewayEvent::AppInactive { app_id },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_raw_shape() {
        let req = SidecarRequest::send_raw(730, 4501, GcHeader::with_source(9), &[1, 2, 3]);
        insta::assert_json_snapshot!(req, @r#"
        {
          "type": "send_raw",
          "app_id": 730,
          "msg_type": 4501,
          "job_id_source": 9,
          "payload": "AQID"
        }
        "#);
    }

    #[test]
    fn log_on_shape() {
        insta::assert_json_snapshot!(SidecarRequest::LogOn, @r#"
        {
          "type": "log_on"
        }
        "#);
    }

    #[test]
    fn message_event_decodes_payload() {
        let event: SidecarEvent = serde_json::from_str(
            r#"{"type":"message","app_id":730,"msg_type":4502,"job_id_target":9,"payload":"AQID"}"#,
        )
        .unwrap();
        let event = GatewayEvent::try_from(event).unwrap();
        assert_eq!(event, GatewayEvent::job_reply(730, 4502, 9, vec![1u8, 2, 3]));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let event = SidecarEvent::Message {
            app_id: 730,
            msg_type: 1,
            job_id_source: None,
            job_id_target: None,
            payload: "not base64!".into(),
        };
        assert!(GatewayEvent::try_from(event).is_err());
    }

    #[test]
    fn lifecycle_events_map() {
        let event: SidecarEvent = serde_json::from_str(r#"{"type":"app_active","app_id":730}"#)
            .unwrap();
        assert_eq!(
            GatewayEvent::try_from(event).unwrap(),
            GatewayEvent::AppActiveConfirmed { app_id: 730 }
        );
    }
}
