//! Error types for the dialogue engine.

use tenantline_core::error::TenantlineError;
use tenantline_core::types::WorkflowState;
use uuid::Uuid;

/// Errors from call handling.
///
/// Business outcomes such as an unknown or ambiguous address are not errors;
/// they are ordinary replies to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("call not found: {0}")]
    CallNotFound(Uuid),
    #[error("call is closed: {0}")]
    CallClosed(Uuid),
    #[error("utterance exceeds maximum length of {0} characters")]
    UtteranceTooLong(usize),
    #[error("invalid workflow transition: {0} -> {1}")]
    InvalidTransition(WorkflowState, WorkflowState),
    #[error("no novel phrasing left for: {0}")]
    Repetition(String),
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<TenantlineError> for DialogueError {
    fn from(err: TenantlineError) -> Self {
        DialogueError::Storage(err.to_string())
    }
}

impl From<DialogueError> for TenantlineError {
    fn from(err: DialogueError) -> Self {
        match err {
            DialogueError::Collaborator(msg) => TenantlineError::Collaborator(msg),
            other => TenantlineError::Dialogue(other.to_string()),
        }
    }
}
