//! Dialogue controller: advances one call session one utterance at a time.
//!
//! Each turn records the utterance, extracts facts, resolves any address
//! against the registry, walks the workflow forward through every slot that
//! is already filled, and composes a reply that the response tracker has
//! checked for repetition.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tenantline_core::config::{DialogueConfig, TenantlineConfig};
use tenantline_core::events::CallEvent;
use tenantline_core::types::{
    AddressStatus, Severity, Slot, Timestamp, Utterance, WorkflowState,
};
use tenantline_registry::{AddressResolution, AddressResolver, PropertyIndex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::caller::{self, Answer};
use crate::collaborator::{TicketOutcome, TicketRequest};
use crate::error::DialogueError;
use crate::issue::IssueExtractor;
use crate::memory::FactUpdate;
use crate::session::{CallSession, TicketStatus};
use crate::workflow::validate_transition;

/// Maximum utterance length in characters.
pub const MAX_UTTERANCE_LENGTH: usize = 2000;

const GREETING: &str =
    "Thank you for calling the maintenance line. What problem can I help you with today?";

/// Side effect the host must carry out after a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemAction {
    /// Hand the request to the ticket service and report back the outcome.
    CreateTicket(TicketRequest),
    /// Fire-and-forget notification.
    Notify {
        channel: String,
        payload: serde_json::Value,
    },
}

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub state: WorkflowState,
    pub actions: Vec<SystemAction>,
    pub events: Vec<CallEvent>,
}

/// Accumulates everything a turn emits before the reply is spoken.
struct Turn {
    call_id: Uuid,
    lead: Vec<String>,
    actions: Vec<SystemAction>,
    events: Vec<CallEvent>,
    /// Something changed that facts alone do not show (partial address, refusal).
    progressed: bool,
}

impl Turn {
    fn new(call_id: Uuid) -> Self {
        Self {
            call_id,
            lead: Vec::new(),
            actions: Vec::new(),
            events: Vec::new(),
            progressed: false,
        }
    }

    fn say(&mut self, sentence: impl Into<String>) {
        self.lead.push(sentence.into());
    }

    fn finish(self, reply: String, state: WorkflowState) -> TurnOutcome {
        TurnOutcome {
            reply,
            state,
            actions: self.actions,
            events: self.events,
        }
    }
}

fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

fn with_lead(lead: &[String], prompt: &str) -> String {
    if lead.is_empty() {
        prompt.to_string()
    } else {
        format!("{} {}", lead.join(" "), prompt)
    }
}

/// The turn-by-turn state machine. Holds no per-call state.
pub struct DialogueController {
    index: Arc<PropertyIndex>,
    resolver: AddressResolver,
    issues: IssueExtractor,
    policy: DialogueConfig,
}

impl DialogueController {
    pub fn new(index: Arc<PropertyIndex>, resolver: AddressResolver, policy: DialogueConfig) -> Self {
        Self {
            index,
            resolver,
            issues: IssueExtractor,
            policy,
        }
    }

    pub fn from_config(index: Arc<PropertyIndex>, config: &TenantlineConfig) -> Self {
        let resolver =
            AddressResolver::from_config(&config.registry, config.dialogue.max_suggestions);
        Self::new(index, resolver, config.dialogue.clone())
    }

    pub fn index(&self) -> &Arc<PropertyIndex> {
        &self.index
    }

    pub fn policy(&self) -> &DialogueConfig {
        &self.policy
    }

    // =========================================================================
    // Call lifecycle
    // =========================================================================

    /// Greet the caller.
    pub fn start_call(&self, session: &mut CallSession) -> TurnOutcome {
        let mut turn = Turn::new(session.id);
        turn.events.push(CallEvent::CallStarted {
            call_id: session.id,
            caller_id: session.caller_id.clone(),
            timestamp: Timestamp::now(),
        });
        info!(call_id = %session.id, caller_id = ?session.caller_id, "Call started");

        session.last_prompt = Some((session.state, session.state.pending_slot()));
        session.prompt_streak = 1;
        let reply = self.speak(session, &mut turn, GREETING);
        turn.finish(reply, session.state)
    }

    /// Process one caller utterance.
    pub fn handle_turn(
        &self,
        session: &mut CallSession,
        text: &str,
        confidence: f32,
    ) -> Result<TurnOutcome, DialogueError> {
        if session.closed {
            return Err(DialogueError::CallClosed(session.id));
        }
        if text.chars().count() > MAX_UTTERANCE_LENGTH {
            return Err(DialogueError::UtteranceTooLong(MAX_UTTERANCE_LENGTH));
        }

        let mut turn = Turn::new(session.id);
        let utterance = Utterance::caller(text, confidence);

        // Recognition noise: ask once, then work with what we have
        if self.is_noise(&utterance) {
            if session.noise_streak < self.policy.max_noise_reprompts {
                session.noise_streak += 1;
                debug!(call_id = %session.id, confidence, "Recognition noise, asking to repeat");
                session.memory.append(utterance);
                let reply = self.speak(
                    session,
                    &mut turn,
                    "Sorry, I didn't quite catch that. Could you say it again?",
                );
                return Ok(turn.finish(reply, session.state));
            }
            warn!(call_id = %session.id, confidence, "Recognition noise persists, continuing best-effort");
        }
        session.noise_streak = 0;

        let state_before = session.state;
        let facts_before = session.memory.summarize();

        // Record and extract
        let update = session.memory.record(utterance);
        self.note_update(session, &update, &mut turn);

        // Slot-specific interpretation
        match state_before {
            WorkflowState::ConfirmingAddress => self.handle_confirmation(session, text, &mut turn)?,
            WorkflowState::Ready | WorkflowState::Completed => {}
            _ => self.capture_address(session, text, &mut turn),
        }
        match state_before {
            WorkflowState::CollectingName => self.capture_name(session, text, &mut turn),
            WorkflowState::CollectingPhone => self.capture_phone(session, text, &mut turn),
            _ => {}
        }

        self.advance(session, &mut turn)?;

        let progressed = turn.progressed
            || session.state != state_before
            || *session.memory.facts() != facts_before;
        let prompt = self.compose(session, &mut turn, text, state_before, progressed);
        let reply = self.speak(session, &mut turn, &prompt);

        debug!(
            call_id = %session.id,
            state = %session.state,
            actions = turn.actions.len(),
            "Turn complete"
        );
        Ok(turn.finish(reply, session.state))
    }

    /// Apply the ticket collaborator's result.
    ///
    /// Ignored once the call is closed or if no ticket is pending.
    pub fn record_ticket_outcome(
        &self,
        session: &mut CallSession,
        outcome: TicketOutcome,
    ) -> Result<Vec<CallEvent>, DialogueError> {
        if session.closed {
            info!(call_id = %session.id, ?outcome, "Ticket outcome arrived after hangup, discarded");
            return Ok(Vec::new());
        }
        if session.ticket != TicketStatus::Pending {
            warn!(call_id = %session.id, ?outcome, "Unexpected ticket outcome ignored");
            return Ok(Vec::new());
        }

        let mut turn = Turn::new(session.id);
        match outcome {
            TicketOutcome::Created { ticket_id } => {
                info!(call_id = %session.id, ticket_id = %ticket_id, "Ticket created");
                turn.events.push(CallEvent::TicketCreated {
                    call_id: session.id,
                    ticket_id: ticket_id.clone(),
                    timestamp: Timestamp::now(),
                });
                session.ticket = TicketStatus::Created { ticket_id };
            }
            TicketOutcome::Failed { reason } => {
                warn!(call_id = %session.id, reason = %reason, "Ticket creation failed, flagging for manual follow-up");
                session.memory.flag_manual_follow_up();
                turn.events.push(CallEvent::TicketFailed {
                    call_id: session.id,
                    reason: reason.clone(),
                    timestamp: Timestamp::now(),
                });
                session.ticket = TicketStatus::Failed { reason };
            }
        }

        self.transition(session, WorkflowState::Completed, &mut turn)?;
        turn.events.push(CallEvent::CallCompleted {
            call_id: session.id,
            manual_follow_up: session.memory.facts().manual_follow_up,
            timestamp: Timestamp::now(),
        });
        Ok(turn.events)
    }

    /// Close the session at hangup. Returns nothing if it was already closed.
    pub fn end_call(&self, session: &mut CallSession) -> Vec<CallEvent> {
        if !session.close() {
            return Vec::new();
        }
        if session.ticket == TicketStatus::Pending {
            warn!(call_id = %session.id, "Call ended while ticket creation was still pending");
        }
        info!(
            call_id = %session.id,
            final_state = %session.state,
            turns = session.memory.turns().len(),
            "Call closed"
        );
        vec![CallEvent::CallClosed {
            call_id: session.id,
            final_state: session.state,
            timestamp: Timestamp::now(),
        }]
    }

    /// Reply used when a turn failed internally.
    pub fn apologize(&self, session: &mut CallSession, err: &DialogueError) -> TurnOutcome {
        error!(call_id = %session.id, state = %session.state, error = %err, "Turn failed");
        let mut turn = Turn::new(session.id);
        let reply = self.speak(
            session,
            &mut turn,
            "I'm sorry, something went wrong on our side. I can keep going with your request, or transfer you to a team member.",
        );
        turn.finish(reply, session.state)
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    fn is_noise(&self, utterance: &Utterance) -> bool {
        let text = utterance.text.trim();
        text.is_empty()
            || !text.chars().any(char::is_alphanumeric)
            || utterance.confidence < self.policy.min_confidence
    }

    fn note_update(&self, session: &mut CallSession, update: &FactUpdate, turn: &mut Turn) {
        for slot in &update.filled {
            debug!(call_id = %session.id, slot = %slot, "Slot filled");
            turn.events.push(CallEvent::SlotFilled {
                call_id: session.id,
                slot: *slot,
                timestamp: Timestamp::now(),
            });
        }

        let facts = session.memory.facts();
        let Some(issue_type) = facts.issue_type else {
            return;
        };

        if facts.severity == Severity::Emergency && !session.emergency_notified {
            warn!(call_id = %session.id, issue = %issue_type, "Emergency reported, notifying on-call");
            let payload = json!({
                "call_id": session.id,
                "issue_type": issue_type,
                "severity": facts.severity,
                "description": facts.issue_description,
                "caller_id": session.caller_id,
            });
            turn.events.push(CallEvent::EmergencyFlagged {
                call_id: session.id,
                issue_type,
                timestamp: Timestamp::now(),
            });
            turn.actions.push(SystemAction::Notify {
                channel: self.policy.emergency_channel.clone(),
                payload,
            });
            session.emergency_notified = true;
            turn.say(format!(
                "That sounds like an emergency, so I'm alerting our on-call team right now about {}.",
                issue_type.spoken()
            ));
        } else if update.filled.contains(&Slot::Issue) {
            turn.say(format!("I'm sorry you're dealing with {}.", issue_type.spoken()));
        }
    }

    fn capture_address(&self, session: &mut CallSession, text: &str, turn: &mut Turn) {
        if session.memory.facts().address_status() == Some(AddressStatus::Exact) {
            return;
        }
        let heard = self.resolver.parse_candidate(text);
        if heard.is_empty() {
            return;
        }

        let expecting = session.state == WorkflowState::CollectingAddress;
        let candidate = match (expecting, session.memory.partial_address()) {
            (true, Some(partial)) => heard.merged_with(partial),
            _ => heard,
        };
        if !candidate.is_complete() {
            if expecting {
                debug!(call_id = %session.id, heard = %candidate.describe(), "Partial address");
                session.memory.remember_partial(candidate);
                turn.progressed = true;
            }
            return;
        }

        let resolution = self
            .resolver
            .resolve_candidate(&candidate, &self.index, &session.rejected);
        let acceptable = match session.state {
            WorkflowState::CollectingAddress => true,
            // Mentioned before being asked: only take it if it clearly is an address.
            WorkflowState::CollectingIssue => {
                candidate.has_street_suffix || resolution.status() != AddressStatus::Unverified
            }
            _ => resolution.status() == AddressStatus::Exact,
        };
        if acceptable {
            self.store_address(session, resolution, turn);
        } else {
            debug!(call_id = %session.id, heard = %candidate.describe(), "Ignoring address-like text");
        }
    }

    fn store_address(&self, session: &mut CallSession, resolution: AddressResolution, turn: &mut Turn) {
        let status = resolution.status();
        turn.events.push(CallEvent::AddressResolved {
            call_id: session.id,
            status,
            raw_input: resolution.raw_input().to_string(),
            timestamp: Timestamp::now(),
        });

        match status {
            AddressStatus::Unverified => {
                warn!(call_id = %session.id, heard = %resolution.candidate().describe(), "Address not found in registry");
                session.unverified_since_spelling += 1;
            }
            _ => info!(call_id = %session.id, status = %status, "Address resolved"),
        }

        let found = resolution.matched().map(|r| r.full_address().to_string());
        if session.memory.offer_address(resolution) {
            turn.events.push(CallEvent::SlotFilled {
                call_id: session.id,
                slot: Slot::Address,
                timestamp: Timestamp::now(),
            });
            if let Some(address) = found {
                turn.say(format!("Thank you, I found {} in our records.", address));
            }
        }
    }

    fn handle_confirmation(
        &self,
        session: &mut CallSession,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), DialogueError> {
        let resolution = match session.memory.facts().address.clone() {
            Some(resolution) if resolution.status() == AddressStatus::Ambiguous => resolution,
            _ => return Ok(()),
        };
        let answer = caller::yes_no(text);

        // "the 629 one"
        let named: Vec<usize> = resolution
            .suggestions()
            .iter()
            .enumerate()
            .filter(|(_, s)| caller::mentions_number(text, s.record.street_number))
            .map(|(i, _)| i)
            .collect();
        if let [position] = named.as_slice() {
            if *position == 0 && answer == Answer::No {
                return self.reject_top(session, &resolution, turn);
            }
            self.accept_suggestion(session, &resolution, *position, turn);
            return Ok(());
        }

        // A different full address
        let candidate = self.resolver.parse_candidate(text);
        if candidate.is_complete() {
            // "no, it's 40 port richmond": the refused suggestion must not come back
            if answer == Answer::No {
                if let Some(top) = resolution.top_suggestion() {
                    info!(call_id = %session.id, address = %top.record.full_address, "Caller rejected suggested address");
                    session.rejected.push(top.record.clone());
                }
            }
            let fresh = self
                .resolver
                .resolve_candidate(&candidate, &self.index, &session.rejected);
            if fresh.status() == AddressStatus::Unverified {
                session.memory.discard_unconfirmed_address();
                self.transition(session, WorkflowState::CollectingAddress, turn)?;
            }
            self.store_address(session, fresh, turn);
            turn.progressed = true;
            return Ok(());
        }

        match answer {
            Answer::Yes => self.accept_suggestion(session, &resolution, 0, turn),
            Answer::No => self.reject_top(session, &resolution, turn)?,
            Answer::Unclear => debug!(call_id = %session.id, "Unclear confirmation answer"),
        }
        Ok(())
    }

    fn accept_suggestion(
        &self,
        session: &mut CallSession,
        resolution: &AddressResolution,
        position: usize,
        turn: &mut Turn,
    ) {
        let Some(confirmed) = resolution.confirm_suggestion(position) else {
            return;
        };
        let address = confirmed
            .matched()
            .map(|r| r.full_address().to_string())
            .unwrap_or_default();
        info!(call_id = %session.id, address = %address, "Caller confirmed suggested address");
        turn.events.push(CallEvent::AddressResolved {
            call_id: session.id,
            status: AddressStatus::Exact,
            raw_input: confirmed.raw_input().to_string(),
            timestamp: Timestamp::now(),
        });
        if session.memory.offer_address(confirmed) {
            turn.say(format!("Great, I have {}.", address));
        }
    }

    fn reject_top(
        &self,
        session: &mut CallSession,
        resolution: &AddressResolution,
        turn: &mut Turn,
    ) -> Result<(), DialogueError> {
        if let Some(top) = resolution.top_suggestion() {
            info!(call_id = %session.id, address = %top.record.full_address, "Caller rejected suggested address");
            session.rejected.push(top.record.clone());
        }
        session.memory.discard_unconfirmed_address();
        self.transition(session, WorkflowState::CollectingAddress, turn)?;
        turn.progressed = true;

        // Offer whatever is left, never a rejected record.
        let retry = self
            .resolver
            .resolve_candidate(resolution.candidate(), &self.index, &session.rejected);
        if retry.status() == AddressStatus::Ambiguous {
            turn.say("Okay, not that one.");
            session.memory.offer_address(retry);
        } else {
            turn.say("Sorry about that.");
        }
        Ok(())
    }

    fn capture_name(&self, session: &mut CallSession, text: &str, turn: &mut Turn) {
        if session.memory.facts().caller_name.is_some() {
            return;
        }
        if let Some(name) = caller::name_answer(text) {
            if session.memory.set_name(name) {
                turn.events.push(CallEvent::SlotFilled {
                    call_id: session.id,
                    slot: Slot::Name,
                    timestamp: Timestamp::now(),
                });
            }
        }
    }

    fn capture_phone(&self, session: &mut CallSession, text: &str, turn: &mut Turn) {
        if session.memory.facts().phone_settled() {
            return;
        }

        if session.caller_id_offered && !session.caller_id_declined {
            match caller::yes_no(text) {
                Answer::Yes => {
                    if let Some(digits) = session.caller_id.as_deref().and_then(caller::extract_phone) {
                        session.memory.set_phone(digits);
                        turn.events.push(CallEvent::SlotFilled {
                            call_id: session.id,
                            slot: Slot::Phone,
                            timestamp: Timestamp::now(),
                        });
                        return;
                    }
                }
                Answer::No if !caller::refuses(text) => {
                    session.caller_id_declined = true;
                    turn.progressed = true;
                    return;
                }
                _ => {}
            }
        }

        // Anything that is not a number counts as a refusal.
        session.phone_refusals += 1;
        turn.progressed = true;
        info!(call_id = %session.id, refusals = session.phone_refusals, "Phone number not given");
        if session.phone_refusals >= self.policy.max_phone_refusals {
            session.memory.decline_phone();
            turn.say("That's fine, we'll go ahead without a phone number.");
        }
    }

    // =========================================================================
    // Workflow
    // =========================================================================

    fn transition(
        &self,
        session: &mut CallSession,
        to: WorkflowState,
        turn: &mut Turn,
    ) -> Result<(), DialogueError> {
        let from = session.state;
        validate_transition(from, to)?;
        info!(call_id = %session.id, from = %from, to = %to, "Workflow transition");
        turn.events.push(CallEvent::StateChanged {
            call_id: turn.call_id,
            from,
            to,
            timestamp: Timestamp::now(),
        });
        session.state = to;
        Ok(())
    }

    /// Move forward through every state whose slot is already filled.
    fn advance(&self, session: &mut CallSession, turn: &mut Turn) -> Result<(), DialogueError> {
        loop {
            let facts = session.memory.facts();
            let status = facts.address_status();
            let next = match session.state {
                WorkflowState::CollectingIssue => facts
                    .issue_type
                    .is_some()
                    .then_some(WorkflowState::CollectingAddress),
                WorkflowState::CollectingAddress => match status {
                    Some(AddressStatus::Exact) => Some(WorkflowState::CollectingName),
                    Some(AddressStatus::Ambiguous) => Some(WorkflowState::ConfirmingAddress),
                    Some(AddressStatus::Unverified)
                        if session.spelling_requests >= self.policy.spelling_rounds
                            && session.unverified_since_spelling > 0 =>
                    {
                        Some(WorkflowState::CollectingName)
                    }
                    _ => None,
                },
                WorkflowState::ConfirmingAddress => (status == Some(AddressStatus::Exact))
                    .then_some(WorkflowState::CollectingName),
                WorkflowState::CollectingName => facts
                    .caller_name
                    .is_some()
                    .then_some(WorkflowState::CollectingPhone),
                WorkflowState::CollectingPhone => {
                    facts.phone_settled().then_some(WorkflowState::Ready)
                }
                WorkflowState::Ready | WorkflowState::Completed => None,
            };
            let Some(next) = next else {
                return Ok(());
            };

            if session.state == WorkflowState::CollectingAddress
                && next == WorkflowState::CollectingName
                && status == Some(AddressStatus::Unverified)
            {
                warn!(call_id = %session.id, "Address still unverified, continuing with manual follow-up");
                session.memory.flag_manual_follow_up();
                turn.say("I still can't find that address, so I'll pass it along as you gave it and a team member will confirm it with you.");
            }

            self.transition(session, next, turn)?;
            if next == WorkflowState::Ready {
                self.request_ticket(session, turn);
            }
        }
    }

    fn request_ticket(&self, session: &mut CallSession, turn: &mut Turn) {
        let facts = session.memory.summarize();
        match TicketRequest::from_facts(session.id, &facts) {
            Some(request) => {
                info!(
                    call_id = %session.id,
                    issue = %request.issue_type,
                    severity = %request.severity,
                    manual_follow_up = request.manual_follow_up,
                    "Requesting ticket"
                );
                turn.events.push(CallEvent::TicketRequested {
                    call_id: session.id,
                    issue_type: request.issue_type,
                    severity: request.severity,
                    timestamp: Timestamp::now(),
                });
                turn.actions.push(SystemAction::CreateTicket(request));
                session.ticket = TicketStatus::Pending;
            }
            None => {
                error!(call_id = %session.id, "Ready without an issue and address, ticket not requested");
                session.memory.flag_manual_follow_up();
                session.ticket = TicketStatus::Failed {
                    reason: "incomplete request".to_string(),
                };
            }
        }
    }

    // =========================================================================
    // Replies
    // =========================================================================

    fn compose(
        &self,
        session: &mut CallSession,
        turn: &mut Turn,
        text: &str,
        state_before: WorkflowState,
        progressed: bool,
    ) -> String {
        let key = (session.state, session.state.pending_slot());
        let repeated = !progressed && session.last_prompt == Some(key);
        let restate = repeated
            && key.1.is_some()
            && session.prompt_streak >= self.policy.loop_guard_turns;

        let prompt = if restate {
            info!(call_id = %session.id, state = %session.state, "Same question again with nothing new, restating");
            self.restate(session)
        } else {
            self.prompt_for(session, text, state_before)
        };

        session.prompt_streak = if repeated { session.prompt_streak + 1 } else { 1 };
        session.last_prompt = Some(key);
        with_lead(&turn.lead, &prompt)
    }

    /// Summary of known facts followed by the missing one.
    fn restate(&self, session: &CallSession) -> String {
        let facts = session.memory.facts();
        let mut known = Vec::new();
        if let Some(issue) = facts.issue_type {
            known.push(issue.spoken().to_string());
        }
        if let Some(resolution) = &facts.address {
            match resolution.status() {
                AddressStatus::Exact => known.push(format!("the address {}", resolution.ticket_address())),
                AddressStatus::Unverified if session.state != WorkflowState::CollectingAddress => {
                    known.push(format!("the address as {}", resolution.ticket_address()))
                }
                _ => {}
            }
        }
        if let Some(name) = &facts.caller_name {
            known.push(format!("your name as {}", name));
        }

        let have = if known.is_empty() {
            "I don't have any details yet".to_string()
        } else {
            format!("So far I have {}", join_list(&known))
        };
        let need = match session.state {
            WorkflowState::CollectingIssue => "a short description of the problem".to_string(),
            WorkflowState::CollectingAddress => {
                "the house number and street name of the property".to_string()
            }
            WorkflowState::ConfirmingAddress => match facts
                .address
                .as_ref()
                .and_then(AddressResolution::top_suggestion)
            {
                Some(top) => format!(
                    "a yes or no: is the address {}",
                    top.record.full_address
                ),
                None => "your address".to_string(),
            },
            WorkflowState::CollectingName => "your name".to_string(),
            WorkflowState::CollectingPhone => "a phone number where we can reach you".to_string(),
            WorkflowState::Ready | WorkflowState::Completed => "nothing else".to_string(),
        };
        let end = if session.state == WorkflowState::ConfirmingAddress { "?" } else { "." };
        format!("{}. I still need {}{}", have, need, end)
    }

    fn prompt_for(&self, session: &mut CallSession, text: &str, state_before: WorkflowState) -> String {
        let facts = session.memory.summarize();
        match session.state {
            WorkflowState::CollectingIssue => {
                "What maintenance problem are you calling about?".to_string()
            }
            WorkflowState::CollectingAddress => {
                if let Some(resolution) = facts
                    .address
                    .as_ref()
                    .filter(|r| r.status() == AddressStatus::Unverified)
                {
                    session.spelling_requests += 1;
                    session.unverified_since_spelling = 0;
                    return format!(
                        "I couldn't find {} in our records. Could you spell the street name letter by letter, and then say the house number one digit at a time?",
                        resolution.candidate().describe()
                    );
                }
                if let Some(partial) = session.memory.partial_address() {
                    match (partial.number, partial.street.as_ref()) {
                        (Some(number), None) => {
                            return format!("Thanks. What street is number {} on?", number)
                        }
                        (None, Some(_)) => {
                            return format!(
                                "And what is the house number on {}?",
                                partial.describe()
                            )
                        }
                        _ => {}
                    }
                }
                if !session.rejected.is_empty() {
                    "What is the correct address? Please give me the house number and the street name.".to_string()
                } else {
                    "What is the address of the property? Please include the house number and street name.".to_string()
                }
            }
            WorkflowState::ConfirmingAddress => {
                let Some(resolution) = facts.address.as_ref() else {
                    return "Could you tell me the address again?".to_string();
                };
                let offered: Vec<String> = resolution
                    .suggestions()
                    .iter()
                    .map(|s| s.record.full_address.clone())
                    .collect();
                match offered.as_slice() {
                    [] => "Could you tell me the address again?".to_string(),
                    [top, ..] if resolution.has_clear_leader() => format!(
                        "I couldn't find that exact address, but I found {}. Is that your address?",
                        top
                    ),
                    [first, rest @ ..] => format!(
                        "I couldn't find that exact address. Did you mean {}, or {}?",
                        first,
                        rest.join(", or ")
                    ),
                }
            }
            WorkflowState::CollectingName => "Can I have your full name, please?".to_string(),
            WorkflowState::CollectingPhone => self.phone_prompt(session),
            WorkflowState::Ready => {
                if state_before == WorkflowState::Ready {
                    return "Your request is still being submitted. Thank you for holding.".to_string();
                }
                let issue = facts.issue_type.map(|i| i.spoken()).unwrap_or("your issue");
                let address = facts
                    .address
                    .as_ref()
                    .map(AddressResolution::ticket_address)
                    .unwrap_or_default();
                let thanks = match &facts.caller_name {
                    Some(name) => format!("Thank you, {}.", name),
                    None => "Thank you.".to_string(),
                };
                let mut line = format!(
                    "{} I'm submitting your request for {} at {} now. This will just take a moment.",
                    thanks, issue, address
                );
                if facts.manual_follow_up {
                    line.push_str(" Since I couldn't verify the address, a team member will confirm it with you.");
                }
                line
            }
            WorkflowState::Completed => self.closing_line(session, text),
        }
    }

    fn phone_prompt(&self, session: &mut CallSession) -> String {
        if session.phone_refusals == 1 {
            return "We only use your number to update you about this repair. Could you share one? If you'd rather not, that's okay.".to_string();
        }
        if session.caller_id_declined {
            return "What number should we use instead?".to_string();
        }
        let caller_digits = session
            .caller_id
            .as_deref()
            .and_then(caller::extract_phone);
        match caller_digits {
            Some(digits) if !session.caller_id_offered => {
                session.caller_id_offered = true;
                format!(
                    "Is {}, the number you're calling from, a good number to reach you?",
                    caller::format_phone(&digits)
                )
            }
            _ => "What is the best phone number to reach you?".to_string(),
        }
    }

    fn closing_line(&self, session: &mut CallSession, text: &str) -> String {
        if !session.ticket_announced {
            session.ticket_announced = true;
            let status = match &session.ticket {
                TicketStatus::Created { ticket_id } => {
                    format!("Your request is in. Your ticket number is {}.", ticket_id)
                }
                _ => "I wasn't able to confirm the ticket just now, but your request will be processed and a team member will follow up with you.".to_string(),
            };
            return format!("{} Is there anything else I can help you with?", status);
        }
        if !session.farewell_given {
            session.farewell_given = true;
            let more = caller::yes_no(text) == Answer::Yes
                || self.issues.detect(text).issue_type.is_some();
            return if more {
                "For a separate problem, please call us back so it gets its own ticket. Thank you for calling, and take care.".to_string()
            } else {
                "Thank you for calling. Take care, goodbye.".to_string()
            };
        }
        "This call is complete. You can hang up at any time. Goodbye.".to_string()
    }

    /// Pass a line through the repetition guard and into the transcript.
    fn speak(&self, session: &mut CallSession, turn: &mut Turn, candidate: &str) -> String {
        let text = match session.tracker.propose(candidate) {
            Ok(text) => text,
            Err(e) => {
                error!(call_id = %session.id, state = %session.state, error = %e, "No novel phrasing left, using fallback");
                turn.events.push(CallEvent::RepetitionFallback {
                    call_id: session.id,
                    state: session.state,
                    timestamp: Timestamp::now(),
                });
                session.tracker.fallback()
            }
        };
        session.memory.record(Utterance::system(text.clone()));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantline_registry::PropertyRecord;

    fn controller() -> DialogueController {
        let index = PropertyIndex::default();
        index
            .load(vec![
                PropertyRecord::new(28, "Alaska Street", None, "28 Alaska Street"),
                PropertyRecord::new(29, "Port Richmond Avenue", None, "29 Port Richmond Avenue"),
                PropertyRecord::new(31, "Port Richmond Avenue", None, "31 Port Richmond Avenue"),
                PropertyRecord::new(627, "Cary Avenue", None, "627 Cary Avenue"),
                PropertyRecord::new(629, "Cary Avenue", None, "629 Cary Avenue"),
            ])
            .unwrap();
        DialogueController::new(
            Arc::new(index),
            AddressResolver::default(),
            DialogueConfig::default(),
        )
    }

    fn start(controller: &DialogueController, caller_id: Option<&str>) -> CallSession {
        let mut session = CallSession::new(caller_id.map(str::to_string));
        controller.start_call(&mut session);
        session
    }

    fn say(controller: &DialogueController, session: &mut CallSession, text: &str) -> TurnOutcome {
        controller.handle_turn(session, text, 0.9).unwrap()
    }

    // ---- greeting and noise ----

    #[test]
    fn test_start_call_greets() {
        let controller = controller();
        let mut session = CallSession::new(None);
        let outcome = controller.start_call(&mut session);
        assert_eq!(outcome.reply, GREETING);
        assert!(matches!(outcome.events[0], CallEvent::CallStarted { .. }));
        assert_eq!(session.spoken().len(), 1);
    }

    #[test]
    fn test_noise_reprompts_once() {
        let controller = controller();
        let mut session = start(&controller, None);

        let first = controller.handle_turn(&mut session, "mmhmm grr", 0.1).unwrap();
        assert!(first.reply.contains("catch that"));
        assert_eq!(session.facts().issue_type, None);

        // second noisy turn is processed best-effort
        let second = controller
            .handle_turn(&mut session, "no heat", 0.2)
            .unwrap();
        assert!(!second.reply.contains("catch that"));
        assert_eq!(second.state, WorkflowState::CollectingAddress);
    }

    #[test]
    fn test_empty_utterance_is_noise() {
        let controller = controller();
        let mut session = start(&controller, None);
        let outcome = controller.handle_turn(&mut session, "  ...  ", 0.99).unwrap();
        assert!(outcome.reply.contains("catch that"));
        assert_eq!(outcome.state, WorkflowState::CollectingIssue);
    }

    #[test]
    fn test_too_long_rejected() {
        let controller = controller();
        let mut session = start(&controller, None);
        let text = "a".repeat(MAX_UTTERANCE_LENGTH + 1);
        let err = controller.handle_turn(&mut session, &text, 0.9).unwrap_err();
        assert!(matches!(err, DialogueError::UtteranceTooLong(_)));
    }

    // ---- issue and emergency ----

    #[test]
    fn test_emergency_emits_notify() {
        let controller = controller();
        let mut session = start(&controller, None);
        let outcome = say(&controller, &mut session, "I smell gas in the hallway");

        assert!(outcome.actions.iter().any(|a| matches!(
            a,
            SystemAction::Notify { channel, .. } if channel == "on-call"
        )));
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, CallEvent::EmergencyFlagged { .. })));
        assert!(outcome.reply.contains("emergency"));

        // only once per call
        let next = say(&controller, &mut session, "it's really strong, there might be a fire");
        assert!(next.actions.is_empty());
    }

    // ---- address ----

    #[test]
    fn test_exact_address_goes_to_name() {
        let controller = controller();
        let mut session = start(&controller, None);
        say(&controller, &mut session, "my heater is broken");
        let outcome = say(&controller, &mut session, "28 alaska street");
        assert_eq!(outcome.state, WorkflowState::CollectingName);
        assert!(outcome.reply.contains("28 Alaska Street"));
    }

    #[test]
    fn test_partial_address_across_turns() {
        let controller = controller();
        let mut session = start(&controller, None);
        say(&controller, &mut session, "the sink is leaking");
        let outcome = say(&controller, &mut session, "it's twenty eight");
        assert_eq!(outcome.state, WorkflowState::CollectingAddress);
        assert!(outcome.reply.contains("What street is number 28 on?"));

        let outcome = say(&controller, &mut session, "alaska street");
        assert_eq!(outcome.state, WorkflowState::CollectingName);
    }

    #[test]
    fn test_address_given_with_issue() {
        let controller = controller();
        let mut session = start(&controller, None);
        let outcome = say(
            &controller,
            &mut session,
            "hi, I live at 28 Alaska Street and my toilet is leaking",
        );
        assert_eq!(outcome.state, WorkflowState::CollectingName);
        let states: Vec<WorkflowState> = outcome
            .events
            .iter()
            .filter_map(|e| match e {
                CallEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![WorkflowState::CollectingAddress, WorkflowState::CollectingName]
        );
    }

    #[test]
    fn test_confirm_by_naming_number() {
        let controller = controller();
        let mut session = start(&controller, None);
        say(&controller, &mut session, "my lights keep flickering");
        let outcome = say(&controller, &mut session, "628 cary avenue");
        assert_eq!(outcome.state, WorkflowState::ConfirmingAddress);

        let outcome = say(&controller, &mut session, "the 629 please");
        assert_eq!(outcome.state, WorkflowState::CollectingName);
        let facts = session.facts();
        let resolved = facts.resolved_address().unwrap();
        assert_eq!(resolved.full_address(), "629 Cary Avenue");
        assert!(resolved.confirmed_by_caller());
    }

    #[test]
    fn test_rejection_offers_next_then_asks_again() {
        let controller = controller();
        let mut session = start(&controller, None);
        say(&controller, &mut session, "my lights keep flickering");
        say(&controller, &mut session, "628 cary avenue");

        let outcome = say(&controller, &mut session, "no");
        assert_eq!(outcome.state, WorkflowState::ConfirmingAddress);
        assert!(outcome.reply.contains("629 Cary Avenue"));
        assert!(!outcome.reply.contains("627"));
        assert_eq!(session.rejected_addresses().len(), 1);

        let outcome = say(&controller, &mut session, "no, that's not it either");
        assert_eq!(outcome.state, WorkflowState::CollectingAddress);
        assert!(outcome.reply.contains("correct address"));
        assert!(session.facts().address.is_none());
    }

    #[test]
    fn test_unverified_after_spelling_round() {
        let controller = controller();
        let mut session = start(&controller, None);
        say(&controller, &mut session, "there are mice in the kitchen");

        let outcome = say(&controller, &mut session, "12 elm street");
        assert_eq!(outcome.state, WorkflowState::CollectingAddress);
        assert!(outcome.reply.contains("couldn't find 12 Elm"));
        assert!(outcome.reply.contains("spell"));

        let outcome = say(&controller, &mut session, "e l m street, one two");
        assert_eq!(outcome.state, WorkflowState::CollectingName);
        let facts = session.facts();
        assert!(facts.manual_follow_up);
        assert_eq!(facts.address_status(), Some(AddressStatus::Unverified));
    }

    // ---- phone ----

    #[test]
    fn test_caller_id_accepted() {
        let controller = controller();
        let mut session = start(&controller, Some("+1 718 555 0142"));
        say(&controller, &mut session, "my heater is broken");
        say(&controller, &mut session, "28 alaska street");
        let outcome = say(&controller, &mut session, "Maria Lopez");
        assert_eq!(outcome.state, WorkflowState::CollectingPhone);
        assert!(outcome.reply.contains("718-555-0142"));

        let outcome = say(&controller, &mut session, "yes");
        assert_eq!(outcome.state, WorkflowState::Ready);
        assert_eq!(session.facts().caller_phone.as_deref(), Some("7185550142"));
        assert!(outcome
            .actions
            .iter()
            .any(|a| matches!(a, SystemAction::CreateTicket(_))));
    }

    #[test]
    fn test_caller_id_declined_then_number_given() {
        let controller = controller();
        let mut session = start(&controller, Some("7185550142"));
        say(&controller, &mut session, "my heater is broken");
        say(&controller, &mut session, "28 alaska street");
        say(&controller, &mut session, "Maria Lopez");

        let outcome = say(&controller, &mut session, "no");
        assert_eq!(outcome.state, WorkflowState::CollectingPhone);
        assert!(outcome.reply.contains("instead"));

        let outcome = say(&controller, &mut session, "use 347 555 0199");
        assert_eq!(outcome.state, WorkflowState::Ready);
        assert_eq!(session.facts().caller_phone.as_deref(), Some("3475550199"));
    }

    // ---- ticket outcome ----

    fn ready_session(controller: &DialogueController) -> CallSession {
        let mut session = start(controller, None);
        say(controller, &mut session, "my heater is broken");
        say(controller, &mut session, "28 alaska street");
        say(controller, &mut session, "Maria Lopez");
        say(controller, &mut session, "718 555 0142");
        assert_eq!(session.state(), WorkflowState::Ready);
        session
    }

    #[test]
    fn test_ticket_created_then_announced() {
        let controller = controller();
        let mut session = ready_session(&controller);

        let events = controller
            .record_ticket_outcome(
                &mut session,
                TicketOutcome::Created {
                    ticket_id: "SV-10001".to_string(),
                },
            )
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, CallEvent::CallCompleted { manual_follow_up: false, .. })));
        assert_eq!(session.state(), WorkflowState::Completed);

        let outcome = say(&controller, &mut session, "okay");
        assert!(outcome.reply.contains("SV-10001"));
        assert!(outcome.reply.contains("anything else"));

        let outcome = say(&controller, &mut session, "no that's all");
        assert!(outcome.reply.contains("goodbye"));
    }

    #[test]
    fn test_ticket_failure_flags_follow_up() {
        let controller = controller();
        let mut session = ready_session(&controller);

        controller
            .record_ticket_outcome(
                &mut session,
                TicketOutcome::Failed {
                    reason: "timed out".to_string(),
                },
            )
            .unwrap();
        assert!(session.facts().manual_follow_up);

        let outcome = say(&controller, &mut session, "hello?");
        assert!(outcome.reply.contains("team member will follow up"));
    }

    #[test]
    fn test_outcome_after_close_is_ignored() {
        let controller = controller();
        let mut session = ready_session(&controller);
        let closed = controller.end_call(&mut session);
        assert!(matches!(closed[0], CallEvent::CallClosed { final_state: WorkflowState::Ready, .. }));

        let events = controller
            .record_ticket_outcome(
                &mut session,
                TicketOutcome::Created {
                    ticket_id: "SV-10001".to_string(),
                },
            )
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(session.state(), WorkflowState::Ready);
        assert_eq!(session.ticket(), &TicketStatus::Pending);

        let err = controller.handle_turn(&mut session, "hello", 0.9).unwrap_err();
        assert!(matches!(err, DialogueError::CallClosed(_)));
        assert!(controller.end_call(&mut session).is_empty());
    }

    #[test]
    fn test_ready_holding_line_while_pending() {
        let controller = controller();
        let mut session = ready_session(&controller);
        let outcome = say(&controller, &mut session, "are you still there?");
        assert_eq!(outcome.state, WorkflowState::Ready);
        assert!(outcome.reply.contains("still being submitted"));
    }

    // ---- loop guard ----

    #[test]
    fn test_loop_guard_restates_facts() {
        let controller = controller();
        let mut session = start(&controller, None);
        let first = say(&controller, &mut session, "the radiator is cold");
        assert!(first.reply.contains("address"));

        let second = say(&controller, &mut session, "um hold on");
        let third = say(&controller, &mut session, "um hold on");

        assert!(second.reply.contains("What is the address of the property"));
        assert!(third.reply.contains("So far I have a heating issue"));
        assert!(third.reply.contains("I still need the house number and street name"));
    }

    #[test]
    fn test_join_list() {
        let items: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_list(&items[..1]), "a");
        assert_eq!(join_list(&items[..2]), "a and b");
        assert_eq!(join_list(&items), "a, b, and c");
    }
}
