//! Live call registry and collaborator dispatch.
//!
//! Turns of one call are serialized by that call's async mutex; different
//! calls never contend beyond the brief map lookup. Ticket creation and
//! notifications run on spawned tasks so the caller is never kept waiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tenantline_core::config::CollaboratorConfig;
use tenantline_core::events::CallEvent;
use tenantline_core::types::{Timestamp, Utterance, WorkflowState};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborator::{Notifier, TicketOutcome, TicketRequest, TicketService};
use crate::controller::{DialogueController, SystemAction, TurnOutcome};
use crate::error::DialogueError;
use crate::memory::SessionFacts;
use crate::session::{CallSession, TicketStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Ended-call summaries kept in memory, oldest dropped first.
const DEFAULT_SUMMARY_HISTORY: usize = 500;

type SessionMap = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<CallSession>>>>>;

/// Record of a finished call.
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: Uuid,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub final_state: WorkflowState,
    pub facts: SessionFacts,
    pub ticket_id: Option<String>,
    pub manual_follow_up: bool,
    pub turn_count: usize,
}

impl CallSummary {
    fn from_session(session: &CallSession) -> Self {
        let facts = session.facts();
        let ticket_id = session.ticket().ticket_id().map(str::to_string);
        // A ticket that was requested but never confirmed needs a person.
        let manual_follow_up = facts.manual_follow_up
            || matches!(
                session.ticket(),
                TicketStatus::Pending | TicketStatus::Failed { .. }
            );
        Self {
            call_id: session.id,
            start_time: session.started_at,
            end_time: session.ended_at.unwrap_or_else(Timestamp::now),
            final_state: session.state(),
            ticket_id,
            manual_follow_up,
            turn_count: session.turns().len(),
            facts,
        }
    }
}

/// Snapshot of a live call.
#[derive(Debug, Clone, Serialize)]
pub struct CallView {
    pub call_id: Uuid,
    pub state: WorkflowState,
    pub facts: SessionFacts,
    pub ticket: TicketStatus,
    pub turns: Vec<Utterance>,
}

/// Owns every live call.
pub struct CallManager {
    controller: Arc<DialogueController>,
    tickets: Arc<dyn TicketService>,
    notifier: Arc<dyn Notifier>,
    sessions: SessionMap,
    finished: Mutex<VecDeque<CallSummary>>,
    summary_history: usize,
    event_tx: broadcast::Sender<CallEvent>,
    ticket_timeout: Duration,
}

impl CallManager {
    pub fn new(
        controller: DialogueController,
        tickets: Arc<dyn TicketService>,
        notifier: Arc<dyn Notifier>,
        config: &CollaboratorConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            controller: Arc::new(controller),
            tickets,
            notifier,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            finished: Mutex::new(VecDeque::new()),
            summary_history: DEFAULT_SUMMARY_HISTORY,
            event_tx,
            ticket_timeout: Duration::from_secs(config.ticket_timeout_secs.max(1)),
        }
    }

    /// Keep at most `limit` ended-call summaries.
    pub fn with_summary_history(mut self, limit: usize) -> Self {
        self.summary_history = limit.max(1);
        self
    }

    pub fn controller(&self) -> &DialogueController {
        &self.controller
    }

    /// Subscribe to lifecycle events from every call.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Open a session and greet the caller.
    pub fn start_call(&self, caller_id: Option<String>) -> Result<(Uuid, TurnOutcome), DialogueError> {
        let mut session = CallSession::new(caller_id);
        let call_id = session.id;
        let outcome = self.controller.start_call(&mut session);

        self.sessions
            .lock()
            .map_err(|e| DialogueError::Storage(format!("session lock poisoned: {}", e)))?
            .insert(call_id, Arc::new(tokio::sync::Mutex::new(session)));

        publish(&self.event_tx, &outcome.events);
        Ok((call_id, outcome))
    }

    /// Run one caller turn and dispatch its side effects.
    pub async fn handle_utterance(
        &self,
        call_id: Uuid,
        text: &str,
        confidence: f32,
    ) -> Result<TurnOutcome, DialogueError> {
        let handle = self.session(call_id)?;
        let outcome = {
            let mut session = handle.lock().await;
            match self.controller.handle_turn(&mut session, text, confidence) {
                Ok(outcome) => outcome,
                Err(e @ (DialogueError::CallClosed(_) | DialogueError::UtteranceTooLong(_))) => {
                    return Err(e)
                }
                Err(e) => self.controller.apologize(&mut session, &e),
            }
        };

        publish(&self.event_tx, &outcome.events);
        self.dispatch(call_id, &outcome.actions);
        Ok(outcome)
    }

    /// Hang up: close the session, drop it and return its summary.
    pub async fn end_call(&self, call_id: Uuid) -> Result<CallSummary, DialogueError> {
        let handle = self
            .sessions
            .lock()
            .map_err(|e| DialogueError::Storage(format!("session lock poisoned: {}", e)))?
            .remove(&call_id)
            .ok_or(DialogueError::CallNotFound(call_id))?;

        let summary = {
            let mut session = handle.lock().await;
            let events = self.controller.end_call(&mut session);
            publish(&self.event_tx, &events);
            CallSummary::from_session(&session)
        };

        info!(
            call_id = %call_id,
            final_state = %summary.final_state,
            ticket_id = ?summary.ticket_id,
            manual_follow_up = summary.manual_follow_up,
            "Call summary recorded"
        );
        let mut finished = self
            .finished
            .lock()
            .map_err(|e| DialogueError::Storage(format!("summary lock poisoned: {}", e)))?;
        while finished.len() >= self.summary_history {
            finished.pop_front();
        }
        finished.push_back(summary.clone());
        Ok(summary)
    }

    pub async fn get_call(&self, call_id: Uuid) -> Result<CallView, DialogueError> {
        let handle = self.session(call_id)?;
        let session = handle.lock().await;
        Ok(CallView {
            call_id,
            state: session.state(),
            facts: session.facts(),
            ticket: session.ticket().clone(),
            turns: session.turns().to_vec(),
        })
    }

    /// Live calls with their current state.
    pub async fn list_calls(&self) -> Result<Vec<(Uuid, WorkflowState)>, DialogueError> {
        let handles: Vec<(Uuid, Arc<tokio::sync::Mutex<CallSession>>)> = self
            .sessions
            .lock()
            .map_err(|e| DialogueError::Storage(format!("session lock poisoned: {}", e)))?
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut calls = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            calls.push((id, handle.lock().await.state()));
        }
        calls.sort_by_key(|(id, _)| *id);
        Ok(calls)
    }

    pub fn active_calls(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Summaries of the most recently ended calls, oldest first.
    pub fn finished_calls(&self) -> Result<Vec<CallSummary>, DialogueError> {
        let finished = self
            .finished
            .lock()
            .map_err(|e| DialogueError::Storage(format!("summary lock poisoned: {}", e)))?;
        Ok(finished.iter().cloned().collect())
    }

    fn session(&self, call_id: Uuid) -> Result<Arc<tokio::sync::Mutex<CallSession>>, DialogueError> {
        self.sessions
            .lock()
            .map_err(|e| DialogueError::Storage(format!("session lock poisoned: {}", e)))?
            .get(&call_id)
            .cloned()
            .ok_or(DialogueError::CallNotFound(call_id))
    }

    fn dispatch(&self, call_id: Uuid, actions: &[SystemAction]) {
        for action in actions {
            match action {
                SystemAction::CreateTicket(request) => {
                    let tickets = Arc::clone(&self.tickets);
                    let sessions = Arc::clone(&self.sessions);
                    let controller = Arc::clone(&self.controller);
                    let event_tx = self.event_tx.clone();
                    let timeout = self.ticket_timeout;
                    let request = request.clone();

                    tokio::spawn(async move {
                        let outcome = match create_with_timeout(tickets.as_ref(), &request, timeout).await {
                            Ok(ticket_id) => TicketOutcome::Created { ticket_id },
                            Err(e) => TicketOutcome::Failed {
                                reason: e.to_string(),
                            },
                        };
                        reconcile_ticket(&sessions, &controller, &event_tx, call_id, outcome).await;
                    });
                }
                SystemAction::Notify { channel, payload } => {
                    let notifier = Arc::clone(&self.notifier);
                    let channel = channel.clone();
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        notifier.notify(&channel, payload).await;
                    });
                }
            }
        }
    }
}

/// A ticket service that does not answer in time counts as a collaborator failure.
async fn create_with_timeout(
    tickets: &dyn TicketService,
    request: &TicketRequest,
    timeout: Duration,
) -> Result<String, DialogueError> {
    match tokio::time::timeout(timeout, tickets.create_ticket(request)).await {
        Ok(result) => result,
        Err(_) => Err(DialogueError::Collaborator(format!(
            "ticket service timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Apply a ticket outcome to its call if the call is still live.
async fn reconcile_ticket(
    sessions: &SessionMap,
    controller: &DialogueController,
    event_tx: &broadcast::Sender<CallEvent>,
    call_id: Uuid,
    outcome: TicketOutcome,
) {
    let handle = match sessions.lock() {
        Ok(map) => map.get(&call_id).cloned(),
        Err(e) => {
            warn!(call_id = %call_id, error = %e, "Session lock poisoned, ticket outcome dropped");
            return;
        }
    };
    let Some(handle) = handle else {
        info!(call_id = %call_id, ?outcome, "Call already ended, ticket outcome discarded");
        return;
    };

    let mut session = handle.lock().await;
    match controller.record_ticket_outcome(&mut session, outcome) {
        Ok(events) => publish(event_tx, &events),
        Err(e) => warn!(call_id = %call_id, error = %e, "Could not apply ticket outcome"),
    }
}

fn publish(event_tx: &broadcast::Sender<CallEvent>, events: &[CallEvent]) {
    for event in events {
        debug!(call_id = %event.call_id(), event = event.event_name(), "Call event");
        // No subscribers is fine.
        let _ = event_tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{LocalTicketService, LogNotifier};
    use tenantline_core::config::DialogueConfig;
    use tenantline_registry::{AddressResolver, PropertyIndex, PropertyRecord};

    fn manager() -> CallManager {
        let index = PropertyIndex::default();
        index
            .load(vec![PropertyRecord::new(28, "Alaska Street", None, "28 Alaska Street")])
            .unwrap();
        let controller = DialogueController::new(
            Arc::new(index),
            AddressResolver::default(),
            DialogueConfig::default(),
        );
        CallManager::new(
            controller,
            Arc::new(LocalTicketService::new("SV")),
            Arc::new(LogNotifier),
            &CollaboratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_and_end_call() {
        let manager = manager();
        let (call_id, greeting) = manager.start_call(None).unwrap();
        assert!(!greeting.reply.is_empty());
        assert_eq!(manager.active_calls(), 1);

        let summary = manager.end_call(call_id).await.unwrap();
        assert_eq!(summary.call_id, call_id);
        assert_eq!(summary.final_state, WorkflowState::CollectingIssue);
        assert_eq!(summary.turn_count, 1);
        assert_eq!(manager.active_calls(), 0);
        assert_eq!(manager.finished_calls().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_history_is_capped() {
        let manager = manager().with_summary_history(3);
        let mut ended = Vec::new();
        for _ in 0..5 {
            let (call_id, _) = manager.start_call(None).unwrap();
            manager.end_call(call_id).await.unwrap();
            ended.push(call_id);
        }

        let kept: Vec<Uuid> = manager
            .finished_calls()
            .unwrap()
            .iter()
            .map(|s| s.call_id)
            .collect();
        assert_eq!(kept, ended[2..].to_vec());
    }

    struct StalledTickets;

    #[async_trait::async_trait]
    impl TicketService for StalledTickets {
        async fn create_ticket(&self, _request: &TicketRequest) -> Result<String, DialogueError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_timeout_is_a_collaborator_error() {
        let request = TicketRequest {
            call_id: Uuid::new_v4(),
            issue_type: tenantline_core::types::IssueType::Plumbing,
            severity: tenantline_core::types::Severity::Standard,
            description: None,
            address: crate::collaborator::TicketAddress::Unverified {
                as_spoken: "12 elm street".to_string(),
            },
            caller_name: None,
            caller_phone: None,
            manual_follow_up: true,
        };

        let err = create_with_timeout(&StalledTickets, &request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogueError::Collaborator(_)));
        assert!(err.to_string().contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_unknown_call() {
        let manager = manager();
        let id = Uuid::new_v4();
        let err = manager.handle_utterance(id, "hello", 0.9).await.unwrap_err();
        assert!(matches!(err, DialogueError::CallNotFound(_)));
        assert!(manager.end_call(id).await.is_err());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let manager = manager();
        let mut rx = manager.subscribe();
        let (call_id, _) = manager.start_call(Some("7185550142".to_string())).unwrap();
        manager
            .handle_utterance(call_id, "my heater is broken", 0.9)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_name(), "call_started");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_name(), "slot_filled");
    }

    #[tokio::test]
    async fn test_list_and_view() {
        let manager = manager();
        let (call_id, _) = manager.start_call(None).unwrap();
        manager
            .handle_utterance(call_id, "the sink is leaking", 0.9)
            .await
            .unwrap();

        let calls = manager.list_calls().await.unwrap();
        assert_eq!(calls, vec![(call_id, WorkflowState::CollectingAddress)]);

        let view = manager.get_call(call_id).await.unwrap();
        assert_eq!(view.turns.len(), 3);
        assert_eq!(view.ticket, TicketStatus::NotRequested);
    }
}
