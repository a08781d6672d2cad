use serde::Serialize;

use crate::wire::{WireError, parse_top_level_fields};

/// Coordinator response codes shared by the action-style requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseReason {
    Ok,
    RateLimited,
    AlreadySubmitted,
    NotAllowed,
    NotFound,
    Unknown,
}

impl ResponseReason {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::RateLimited,
            2 => Self::AlreadySubmitted,
            3 => Self::NotAllowed,
            4 => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RateLimited => "rate_limited",
            Self::AlreadySubmitted => "already_submitted",
            Self::NotAllowed => "not_allowed",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of a request whose reply is just a response code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub code: u64,
    pub message: String,
}

impl ActionResult {
    pub fn from_code(code: u64) -> Self {
        let reason = ResponseReason::from_code(code);
        Self {
            success: reason == ResponseReason::Ok,
            code,
            message: reason.as_str().to_string(),
        }
    }

    /// Decode a reply whose field 1 is the response code. An absent code
    /// means success, as with any defaulted varint.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let fields = parse_top_level_fields(payload)?;
        let code = fields
            .first(1)
            .and_then(|v| v.as_safe_integer())
            .unwrap_or(0);
        Ok(Self::from_code(code))
    }
}
