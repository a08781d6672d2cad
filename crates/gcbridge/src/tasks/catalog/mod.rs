//! Built-in task types.

use std::sync::Arc;

use crate::bridge::GcBridge;

use super::{RegistryError, TaskRegistry};

mod lookup_profile;
mod outcome;
mod send_invite;
mod submit_value;

pub use lookup_profile::{
    LookupProfile, LookupProfileHandler, ProfileSummary, profile_account_ids, summarize,
};
pub use outcome::{ActionResult, ResponseReason};
pub use send_invite::{SendInvite, SendInviteHandler};
pub use submit_value::{SubmitValue, SubmitValueHandler};

/// Account ids are 32-bit and never zero.
pub(crate) fn validate_account_id(account_id: u64) -> Result<(), String> {
    if account_id == 0 || account_id > u64::from(u32::MAX) {
        return Err(format!(
            "accountId must be between 1 and {}, got {account_id}",
            u32::MAX
        ));
    }
    Ok(())
}

/// A registry with every built-in task type wired to `bridge`.
pub fn default_registry(bridge: Arc<GcBridge>) -> Result<TaskRegistry, RegistryError> {
    let mut registry = TaskRegistry::new();
    registry.register::<SubmitValue, _>(SubmitValueHandler::new(Arc::clone(&bridge)))?;
    registry.register::<LookupProfile, _>(LookupProfileHandler::new(Arc::clone(&bridge)))?;
    registry.register::<SendInvite, _>(SendInviteHandler::new(bridge))?;
    Ok(registry)
}
