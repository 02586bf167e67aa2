use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AddressStatus, IssueType, Severity, Slot, Timestamp, WorkflowState};

/// Lifecycle events emitted while a call is processed.
///
/// Consumed by:
/// - The broadcast channel (dashboards, transcript writers)
/// - The tracing log
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CallEvent {
    /// A call connected and a session was created.
    CallStarted {
        call_id: Uuid,
        caller_id: Option<String>,
        timestamp: Timestamp,
    },

    /// A required fact became known.
    SlotFilled {
        call_id: Uuid,
        slot: Slot,
        timestamp: Timestamp,
    },

    /// The workflow moved between states.
    StateChanged {
        call_id: Uuid,
        from: WorkflowState,
        to: WorkflowState,
        timestamp: Timestamp,
    },

    /// An address utterance was resolved against the registry.
    AddressResolved {
        call_id: Uuid,
        status: AddressStatus,
        raw_input: String,
        timestamp: Timestamp,
    },

    /// An emergency was reported and the on-call channel is being notified.
    EmergencyFlagged {
        call_id: Uuid,
        issue_type: IssueType,
        timestamp: Timestamp,
    },

    /// All facts are gathered and ticket creation was handed off.
    TicketRequested {
        call_id: Uuid,
        issue_type: IssueType,
        severity: Severity,
        timestamp: Timestamp,
    },

    /// The ticket collaborator reported success.
    TicketCreated {
        call_id: Uuid,
        ticket_id: String,
        timestamp: Timestamp,
    },

    /// The ticket collaborator failed or timed out; the call needs manual follow-up.
    TicketFailed {
        call_id: Uuid,
        reason: String,
        timestamp: Timestamp,
    },

    /// No novel phrasing was available and the generic fallback was spoken.
    RepetitionFallback {
        call_id: Uuid,
        state: WorkflowState,
        timestamp: Timestamp,
    },

    /// The workflow reached `Completed`.
    CallCompleted {
        call_id: Uuid,
        manual_follow_up: bool,
        timestamp: Timestamp,
    },

    /// The caller hung up or the call was ended; the session is closed.
    CallClosed {
        call_id: Uuid,
        final_state: WorkflowState,
        timestamp: Timestamp,
    },
}

impl CallEvent {
    /// Returns the call the event belongs to.
    pub fn call_id(&self) -> Uuid {
        match self {
            CallEvent::CallStarted { call_id, .. }
            | CallEvent::SlotFilled { call_id, .. }
            | CallEvent::StateChanged { call_id, .. }
            | CallEvent::AddressResolved { call_id, .. }
            | CallEvent::EmergencyFlagged { call_id, .. }
            | CallEvent::TicketRequested { call_id, .. }
            | CallEvent::TicketCreated { call_id, .. }
            | CallEvent::TicketFailed { call_id, .. }
            | CallEvent::RepetitionFallback { call_id, .. }
            | CallEvent::CallCompleted { call_id, .. }
            | CallEvent::CallClosed { call_id, .. } => *call_id,
        }
    }

    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            CallEvent::CallStarted { timestamp, .. }
            | CallEvent::SlotFilled { timestamp, .. }
            | CallEvent::StateChanged { timestamp, .. }
            | CallEvent::AddressResolved { timestamp, .. }
            | CallEvent::EmergencyFlagged { timestamp, .. }
            | CallEvent::TicketRequested { timestamp, .. }
            | CallEvent::TicketCreated { timestamp, .. }
            | CallEvent::TicketFailed { timestamp, .. }
            | CallEvent::RepetitionFallback { timestamp, .. }
            | CallEvent::CallCompleted { timestamp, .. }
            | CallEvent::CallClosed { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging and streaming.
    pub fn event_name(&self) -> &'static str {
        match self {
            CallEvent::CallStarted { .. } => "call_started",
            CallEvent::SlotFilled { .. } => "slot_filled",
            CallEvent::StateChanged { .. } => "state_changed",
            CallEvent::AddressResolved { .. } => "address_resolved",
            CallEvent::EmergencyFlagged { .. } => "emergency_flagged",
            CallEvent::TicketRequested { .. } => "ticket_requested",
            CallEvent::TicketCreated { .. } => "ticket_created",
            CallEvent::TicketFailed { .. } => "ticket_failed",
            CallEvent::RepetitionFallback { .. } => "repetition_fallback",
            CallEvent::CallCompleted { .. } => "call_completed",
            CallEvent::CallClosed { .. } => "call_closed",
        }
    }
}
