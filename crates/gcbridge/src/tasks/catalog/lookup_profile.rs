//! `LOOKUP_PROFILE`: fetch a player's profile and report a value derived
//! from it. Replies are keyed by the account ids of the profiles they carry.
//!
//! Reply layout (players profile):
//! - field 1, repeated: profile
//!   - field 1: account id
//!   - field 6: ranking
//!     - field 2: rank id

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeError, GcBridge, ReplyRoute};
use crate::correlator::RequestContext;
use crate::gc::{GcMessage, msg};
use crate::tasks::{Handler, TaskContext, TaskError, TaskKind};
use crate::wire::{Fields, MessageWriter, WireError, parse_top_level_fields};

/// Detail level asked of the coordinator; 32 includes ranking data.
const REQUEST_LEVEL: u64 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LookupProfile {
    pub account_id: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub account_id: u64,
    pub derived_value: Option<u64>,
}

impl TaskKind for LookupProfile {
    const TYPE: &'static str = "LOOKUP_PROFILE";
    type Output = ProfileSummary;

    fn validate(&self) -> Result<(), String> {
        super::validate_account_id(self.account_id)
    }
}

impl LookupProfile {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = MessageWriter::new();
        w.varint(1, self.account_id)?.varint(2, REQUEST_LEVEL)?;
        Ok(w.finish())
    }
}

fn profiles(payload: &[u8]) -> Result<Vec<Fields>, WireError> {
    parse_top_level_fields(payload)?
        .all_bytes(1)
        .map(parse_top_level_fields)
        .collect()
}

/// Account ids of every profile in a players-profile reply.
pub fn profile_account_ids(payload: &[u8]) -> Result<Vec<u64>, WireError> {
    Ok(profiles(payload)?
        .iter()
        .filter_map(|profile| profile.first_varint(1))
        .collect())
}

/// Pick `account_id`'s profile out of a reply and summarize it.
pub fn summarize(payload: &[u8], account_id: u64) -> Result<Option<ProfileSummary>, WireError> {
    for profile in profiles(payload)? {
        if profile.first_varint(1) != Some(account_id) {
            continue;
        }
        let derived_value = match profile.first_bytes(6) {
            Some(ranking) => parse_top_level_fields(ranking)?
                .first(2)
                .and_then(|v| v.as_safe_integer()),
            None => None,
        };
        return Ok(Some(ProfileSummary {
            account_id,
            derived_value,
        }));
    }
    Ok(None)
}

pub struct LookupProfileHandler {
    bridge: Arc<GcBridge>,
}

impl LookupProfileHandler {
    pub fn new(bridge: Arc<GcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Handler<LookupProfile> for LookupProfileHandler {
    async fn handle(
        &self,
        task: LookupProfile,
        _ctx: &TaskContext,
    ) -> Result<ProfileSummary, TaskError> {
        let request = GcMessage::new(msg::REQUEST_PLAYERS_PROFILE, task.encode()?);
        let reply = self
            .bridge
            .request_keyed(
                request,
                msg::PLAYERS_PROFILE,
                task.account_id,
                RequestContext::for_account(task.account_id),
                task.timeout_ms.map(Duration::from_millis),
            )
            .await?;

        let account_id = reply.context.account_id.unwrap_or(task.account_id);
        summarize(&reply.payload, account_id)?.ok_or_else(|| {
            TaskError::Bridge(BridgeError::Protocol(format!(
                "profile reply did not contain account {account_id}"
            )))
        })
    }

    fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
        vec![(msg::PLAYERS_PROFILE, ReplyRoute::Keyed(profile_account_ids))]
    }
}
