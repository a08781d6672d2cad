use crate::bridge::BridgeError;
use crate::wire::WireError;

/// Why a task ended FAILED. The `Display` form is what lands in the
/// task's `error` column.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl From<WireError> for TaskError {
    fn from(e: WireError) -> Self {
        Self::Bridge(BridgeError::from(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task type '{0}' is already registered")]
    AlreadyRegistered(&'static str),

    #[error("reply type {msg_type} is routed by '{existing}' and cannot also be routed for '{task_type}'")]
    RouteConflict {
        msg_type: u32,
        existing: &'static str,
        task_type: &'static str,
    },
}
