//! Workflow state machine with validated transitions.
//!
//! CollectingIssue -> CollectingAddress -> ConfirmingAddress -> CollectingName
//! -> CollectingPhone -> Ready -> Completed
//!
//! ConfirmingAddress may fall back to CollectingAddress on rejection, and an
//! address that stays unverified moves straight on to CollectingName.

use tenantline_core::types::WorkflowState;

use crate::error::DialogueError;

/// Validate that a workflow transition is allowed.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), DialogueError> {
    use WorkflowState::*;

    let valid = matches!(
        (from, to),
        (CollectingIssue, CollectingAddress)
            | (CollectingAddress, ConfirmingAddress)
            | (CollectingAddress, CollectingName)
            | (ConfirmingAddress, CollectingName)
            | (ConfirmingAddress, CollectingAddress)
            | (CollectingName, CollectingPhone)
            | (CollectingPhone, Ready)
            | (Ready, Completed)
    );

    if valid {
        Ok(())
    } else {
        Err(DialogueError::InvalidTransition(from, to))
    }
}

/// Whether the workflow still accepts caller facts.
pub fn is_terminal(state: WorkflowState) -> bool {
    matches!(state, WorkflowState::Completed)
}
