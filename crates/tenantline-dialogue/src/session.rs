//! State for one phone call, created at connect and dropped at hangup.

use serde::Serialize;
use tenantline_core::types::{Slot, Timestamp, Utterance, WorkflowState};
use tenantline_registry::PropertyRecord;
use uuid::Uuid;

use crate::memory::{ConversationMemory, SessionFacts};
use crate::tracker::ResponseTracker;

/// Where ticket creation stands for this call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    NotRequested,
    Pending,
    Created { ticket_id: String },
    Failed { reason: String },
}

impl TicketStatus {
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            TicketStatus::Created { ticket_id } => Some(ticket_id),
            _ => None,
        }
    }
}

/// Everything the dialogue knows about one call.
///
/// Sessions share nothing with each other; the controller mutates one
/// session per turn.
#[derive(Debug)]
pub struct CallSession {
    pub id: Uuid,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    /// Number the call came from, offered back during the phone step.
    pub caller_id: Option<String>,
    pub memory: ConversationMemory,
    pub tracker: ResponseTracker,
    pub(crate) state: WorkflowState,
    pub(crate) closed: bool,

    // recognition noise
    pub(crate) noise_streak: u32,

    // loop guard
    pub(crate) last_prompt: Option<(WorkflowState, Option<Slot>)>,
    pub(crate) prompt_streak: u32,

    // address
    pub(crate) spelling_requests: u32,
    /// Unverified addresses heard since the caller was last asked to spell.
    pub(crate) unverified_since_spelling: u32,
    pub(crate) rejected: Vec<PropertyRecord>,

    // phone
    pub(crate) phone_refusals: u32,
    pub(crate) caller_id_offered: bool,
    pub(crate) caller_id_declined: bool,

    pub(crate) ticket: TicketStatus,
    pub(crate) ticket_announced: bool,
    pub(crate) emergency_notified: bool,
    pub(crate) farewell_given: bool,
}

impl CallSession {
    pub fn new(caller_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Timestamp::now(),
            ended_at: None,
            caller_id: caller_id.filter(|c| !c.trim().is_empty()),
            memory: ConversationMemory::new(),
            tracker: ResponseTracker::new(),
            state: WorkflowState::default(),
            closed: false,
            noise_streak: 0,
            last_prompt: None,
            prompt_streak: 0,
            spelling_requests: 0,
            unverified_since_spelling: 0,
            rejected: Vec::new(),
            phone_refusals: 0,
            caller_id_offered: false,
            caller_id_declined: false,
            ticket: TicketStatus::NotRequested,
            ticket_announced: false,
            emergency_notified: false,
            farewell_given: false,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn facts(&self) -> SessionFacts {
        self.memory.summarize()
    }

    pub fn ticket(&self) -> &TicketStatus {
        &self.ticket
    }

    pub fn turns(&self) -> &[Utterance] {
        self.memory.turns()
    }

    /// System lines spoken so far.
    pub fn spoken(&self) -> &[String] {
        self.tracker.history()
    }

    /// Suggestions the caller has turned down on this call.
    pub fn rejected_addresses(&self) -> &[PropertyRecord] {
        &self.rejected
    }

    /// Mark the call over. Idempotent.
    pub(crate) fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.ended_at = Some(Timestamp::now());
        true
    }
}
