//! Tenantline dialogue crate - the turn-by-turn maintenance call engine.
//!
//! Each call gets a [`CallSession`] holding its own memory, response tracker
//! and workflow state. The [`DialogueController`] advances a session one
//! utterance at a time; the [`CallManager`] owns live sessions and runs the
//! ticket and notification collaborators off the turn loop.

pub mod caller;
pub mod collaborator;
pub mod controller;
pub mod error;
pub mod issue;
pub mod manager;
pub mod memory;
pub mod session;
pub mod tracker;
pub mod workflow;

pub use collaborator::{
    LocalTicketService, LogNotifier, Notifier, TicketAddress, TicketOutcome, TicketRequest,
    TicketService,
};
pub use controller::{DialogueController, SystemAction, TurnOutcome, MAX_UTTERANCE_LENGTH};
pub use error::DialogueError;
pub use issue::{IssueClassification, IssueExtractor};
pub use manager::{CallManager, CallSummary, CallView};
pub use memory::{ConversationMemory, SessionFacts};
pub use session::{CallSession, TicketStatus};
pub use tracker::ResponseTracker;
