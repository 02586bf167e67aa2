//! Per-call conversation memory.
//!
//! Holds the append-only transcript and the facts extracted from it. Facts
//! only ever grow more certain: the first stated issue is kept, severity only
//! rises, and an exact address is never replaced.

use serde::Serialize;
use tenantline_core::types::{AddressStatus, IssueType, Severity, Slot, Speaker, Utterance};
use tenantline_registry::{AddressResolution, CandidateAddress, ResolvedAddress};
use tracing::debug;

use crate::caller;
use crate::issue::{IssueClassification, IssueExtractor};

/// Read-only snapshot of everything known about the caller's request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionFacts {
    pub issue_type: Option<IssueType>,
    pub severity: Severity,
    /// The utterance in which the issue was first described.
    pub issue_description: Option<String>,
    pub address: Option<AddressResolution>,
    pub caller_name: Option<String>,
    /// Ten bare digits.
    pub caller_phone: Option<String>,
    /// The caller declined to give a number; the slot is closed without one.
    pub phone_declined: bool,
    pub manual_follow_up: bool,
}

impl SessionFacts {
    pub fn address_status(&self) -> Option<AddressStatus> {
        self.address.as_ref().map(AddressResolution::status)
    }

    pub fn resolved_address(&self) -> Option<&ResolvedAddress> {
        self.address.as_ref().and_then(AddressResolution::matched)
    }

    pub fn phone_settled(&self) -> bool {
        self.caller_phone.is_some() || self.phone_declined
    }

    fn classification(&self) -> Option<IssueClassification> {
        self.issue_type.map(|issue_type| IssueClassification {
            issue_type: Some(issue_type),
            severity: self.severity,
        })
    }
}

/// What one caller utterance added to the facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactUpdate {
    pub filled: Vec<Slot>,
    /// Severity rose on this turn.
    pub severity_raised: bool,
}

impl FactUpdate {
    pub fn is_empty(&self) -> bool {
        self.filled.is_empty() && !self.severity_raised
    }
}

/// Transcript plus extracted facts for one call.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Utterance>,
    facts: SessionFacts,
    partial_address: Option<CandidateAddress>,
    extractor: IssueExtractor,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an utterance and, for caller speech, extract what it adds.
    pub fn record(&mut self, utterance: Utterance) -> FactUpdate {
        let mut update = FactUpdate::default();
        if utterance.speaker == Speaker::System {
            self.turns.push(utterance);
            return update;
        }

        let text = utterance.text.clone();
        self.turns.push(utterance);

        let classified = self.extractor.classify(&text, self.facts.classification());
        if self.facts.issue_type.is_none() {
            if let Some(issue_type) = classified.issue_type {
                self.facts.issue_type = Some(issue_type);
                self.facts.issue_description = Some(text.trim().to_string());
                update.filled.push(Slot::Issue);
            }
        }
        if classified.severity > self.facts.severity {
            debug!(from = %self.facts.severity, to = %classified.severity, "Severity raised");
            self.facts.severity = classified.severity;
            update.severity_raised = true;
        }

        if let Some(name) = caller::explicit_name(&text) {
            if self.set_name(name) {
                update.filled.push(Slot::Name);
            }
        }
        if let Some(phone) = caller::extract_phone(&text) {
            if self.set_phone(phone) {
                update.filled.push(Slot::Phone);
            }
        }

        update
    }

    /// Append without extraction, for speech too garbled to trust.
    pub fn append(&mut self, utterance: Utterance) {
        self.turns.push(utterance);
    }

    pub fn summarize(&self) -> SessionFacts {
        self.facts.clone()
    }

    pub fn facts(&self) -> &SessionFacts {
        &self.facts
    }

    pub fn turns(&self) -> &[Utterance] {
        &self.turns
    }

    pub fn caller_turn_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|u| u.speaker == Speaker::Caller)
            .count()
    }

    /// Store a resolution unless it would lower certainty.
    ///
    /// An exact address is final. Anything else gives way to a newer
    /// resolution of equal or better status. Returns whether it was stored.
    pub fn offer_address(&mut self, resolution: AddressResolution) -> bool {
        let accept = match self.facts.address_status() {
            None => true,
            Some(AddressStatus::Exact) => false,
            Some(current) => resolution.status() >= current,
        };
        if accept {
            self.partial_address = None;
            self.facts.address = Some(resolution);
        }
        accept
    }

    /// Drop an address that was never confirmed, after the caller rejected it.
    pub fn discard_unconfirmed_address(&mut self) -> Option<AddressResolution> {
        match self.facts.address_status() {
            Some(AddressStatus::Exact) | None => None,
            Some(_) => self.facts.address.take(),
        }
    }

    /// Returns false if a name was already known.
    pub fn set_name(&mut self, name: String) -> bool {
        if self.facts.caller_name.is_some() {
            return false;
        }
        self.facts.caller_name = Some(name);
        true
    }

    /// Returns false if a phone number was already known.
    pub fn set_phone(&mut self, digits: String) -> bool {
        if self.facts.caller_phone.is_some() {
            return false;
        }
        self.facts.caller_phone = Some(digits);
        self.facts.phone_declined = false;
        true
    }

    pub fn decline_phone(&mut self) {
        if self.facts.caller_phone.is_none() {
            self.facts.phone_declined = true;
        }
    }

    pub fn flag_manual_follow_up(&mut self) {
        self.facts.manual_follow_up = true;
    }

    /// Half an address heard so far ("628" with no street yet).
    pub fn partial_address(&self) -> Option<&CandidateAddress> {
        self.partial_address.as_ref()
    }

    pub fn remember_partial(&mut self, candidate: CandidateAddress) {
        self.partial_address = Some(candidate);
    }
}
