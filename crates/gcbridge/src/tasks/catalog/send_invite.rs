//! `SEND_INVITE`: invite a player to the party. The coordinator echoes the
//! request's job id, so the reply is matched by job id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use super::outcome::ActionResult;
use crate::bridge::GcBridge;
use crate::correlator::RequestContext;
use crate::gc::{GcMessage, msg};
use crate::tasks::{Handler, TaskContext, TaskError, TaskKind};
use crate::wire::{MessageWriter, WireError};

/// Account-type bits of a 64-bit player id.
const ACCOUNT_TYPE_SHIFT: u32 = 52;
const ACCOUNT_TYPE_INDIVIDUAL: u64 = 1;

/// Player ids exceed JSON's exact integer range, so accept them as strings
/// as well as numbers.
fn player_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(id) => Ok(id),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("steamId '{text}' is not an unsigned 64-bit integer"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendInvite {
    #[serde(deserialize_with = "player_id")]
    pub steam_id: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TaskKind for SendInvite {
    const TYPE: &'static str = "SEND_INVITE";
    type Output = ActionResult;

    fn validate(&self) -> Result<(), String> {
        let account_type = (self.steam_id >> ACCOUNT_TYPE_SHIFT) & 0xf;
        if account_type != ACCOUNT_TYPE_INDIVIDUAL || self.steam_id & 0xffff_ffff == 0 {
            return Err(format!(
                "steamId {} does not identify an individual account",
                self.steam_id
            ));
        }
        Ok(())
    }
}

impl SendInvite {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = MessageWriter::new();
        w.fixed64(1, self.steam_id)?;
        Ok(w.finish())
    }
}

pub struct SendInviteHandler {
    bridge: Arc<GcBridge>,
}

impl SendInviteHandler {
    pub fn new(bridge: Arc<GcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Handler<SendInvite> for SendInviteHandler {
    async fn handle(&self, task: SendInvite, _ctx: &TaskContext) -> Result<ActionResult, TaskError> {
        let request = GcMessage::new(msg::INVITE_TO_PARTY, task.encode()?);
        let reply = self
            .bridge
            .request_job(
                request,
                RequestContext::default(),
                task.timeout_ms.map(Duration::from_millis),
            )
            .await?;
        Ok(ActionResult::decode(&reply.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FieldValue, parse_top_level_fields};

    const PLAYER: u64 = 76561197960287930;

    fn parse(json: &str) -> Result<SendInvite, String> {
        let task: SendInvite = serde_json::from_str(json).map_err(|e| e.to_string())?;
        task.validate()?;
        Ok(task)
    }

    #[test]
    fn accepts_string_and_number() {
        assert_eq!(
            parse(r#"{"steamId":"76561197960287930"}"#).unwrap().steam_id,
            PLAYER
        );
        assert_eq!(parse(r#"{"steamId":76561197960287930}"#).unwrap().steam_id, PLAYER);
    }

    #[test]
    fn rejects_non_individual_ids() {
        assert!(parse(r#"{"steamId":"12345"}"#).is_err());
        assert!(parse(r#"{"steamId":"not a number"}"#).is_err());
        assert!(parse(r#"{"steamId":"-76561197960287930"}"#).is_err());
        // Individual account type but zero account number.
        assert!(parse(r#"{"steamId":"76561197960265728"}"#).is_err());
    }

    #[test]
    fn encodes_fixed64() {
        let task = parse(r#"{"steamId":"76561197960287930"}"#).unwrap();
        let fields = parse_top_level_fields(&task.encode().unwrap()).unwrap();
        assert_eq!(fields.first(1), Some(&FieldValue::Fixed64(PLAYER)));
    }
}
