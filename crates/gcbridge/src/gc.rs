//! Game coordinator message identifiers and routing header.

use serde::{Deserialize, Serialize};

use crate::wire::{MessageWriter, WireError};

/// GC message type identifiers used by the bridge and the task catalog.
pub mod msg {
    pub const CLIENT_WELCOME: u32 = 4004;
    pub const CLIENT_HELLO: u32 = 4006;
    pub const INVITE_TO_PARTY: u32 = 4501;
    pub const INVITE_TO_PARTY_RESPONSE: u32 = 4502;
    pub const REQUEST_PLAYERS_PROFILE: u32 = 9127;
    pub const PLAYERS_PROFILE: u32 = 9128;
    pub const SUBMIT_PLAYER_VALUE: u32 = 9131;
    pub const SUBMIT_PLAYER_VALUE_RESPONSE: u32 = 9132;
}

/// Protocol version advertised in the hello.
pub const CLIENT_PROTOCOL_VERSION: u32 = 2_000_202;

/// Job routing header carried alongside a GC message.
///
/// A request that sets `job_id_source` is answered with the same id in
/// `job_id_target`, which lets replies be matched without FIFO ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id_source: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id_target: Option<u64>,
}

impl GcHeader {
    pub fn with_source(job_id: u64) -> Self {
        Self {
            job_id_source: Some(job_id),
            job_id_target: None,
        }
    }

    pub fn reply_to(job_id: u64) -> Self {
        Self {
            job_id_source: None,
            job_id_target: Some(job_id),
        }
    }
}

/// Outbound GC message: type plus encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcMessage {
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

impl GcMessage {
    pub fn new(msg_type: u32, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }
}

pub fn encode_hello() -> Result<Vec<u8>, WireError> {
    let mut w = MessageWriter::new();
    w.varint(1, u64::from(CLIENT_PROTOCOL_VERSION))?;
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parse_top_level_fields;

    #[test]
    fn hello_carries_version() {
        let fields = parse_top_level_fields(&encode_hello().unwrap()).unwrap();
        assert_eq!(
            fields.first_varint(1),
            Some(u64::from(CLIENT_PROTOCOL_VERSION))
        );
    }

    #[test]
    fn header_serializes_sparse() {
        insta::assert_json_snapshot!(GcHeader::with_source(7), @r#"
        {
          "job_id_source": 7
        }
        "#);
        insta::assert_json_snapshot!(GcHeader::default(), @"{}");
    }
}
