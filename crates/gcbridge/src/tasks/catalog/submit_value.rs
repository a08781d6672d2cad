//! `SUBMIT_VALUE`: submit a per-player value. The reply carries no request
//! id, so it is FIFO-correlated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::outcome::ActionResult;
use crate::bridge::{GcBridge, ReplyRoute};
use crate::correlator::RequestContext;
use crate::gc::{GcMessage, msg};
use crate::tasks::{Handler, TaskContext, TaskError, TaskKind};
use crate::wire::{MessageWriter, WireError};

const MAX_NOTE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitValue {
    pub account_id: u64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TaskKind for SubmitValue {
    const TYPE: &'static str = "SUBMIT_VALUE";
    type Output = ActionResult;

    fn validate(&self) -> Result<(), String> {
        super::validate_account_id(self.account_id)?;
        if let Some(note) = &self.note
            && note.chars().count() > MAX_NOTE_LEN
        {
            return Err(format!("note must be at most {MAX_NOTE_LEN} characters"));
        }
        Ok(())
    }
}

impl SubmitValue {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = MessageWriter::new();
        w.varint(1, self.account_id)?;
        if let Some(note) = &self.note {
            w.string(2, note)?;
        }
        Ok(w.finish())
    }
}

pub struct SubmitValueHandler {
    bridge: Arc<GcBridge>,
}

impl SubmitValueHandler {
    pub fn new(bridge: Arc<GcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Handler<SubmitValue> for SubmitValueHandler {
    async fn handle(&self, task: SubmitValue, _ctx: &TaskContext) -> Result<ActionResult, TaskError> {
        let request = GcMessage::new(msg::SUBMIT_PLAYER_VALUE, task.encode()?);
        let reply = self
            .bridge
            .request_fifo(
                request,
                msg::SUBMIT_PLAYER_VALUE_RESPONSE,
                RequestContext::for_account(task.account_id),
                task.timeout_ms.map(Duration::from_millis),
            )
            .await?;
        Ok(ActionResult::decode(&reply.payload)?)
    }

    fn reply_routes(&self) -> Vec<(u32, ReplyRoute)> {
        vec![(msg::SUBMIT_PLAYER_VALUE_RESPONSE, ReplyRoute::Fifo)]
    }
}
