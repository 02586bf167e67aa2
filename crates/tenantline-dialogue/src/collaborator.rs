//! Ticket-creation and notification collaborators.
//!
//! Both run off the turn loop. The dialogue only ever sees a
//! [`TicketOutcome`]; how a ticket system is reached is up to the
//! implementation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tenantline_core::types::{IssueType, Severity};
use tenantline_registry::ResolvedAddress;
use tracing::info;
use uuid::Uuid;

use crate::error::DialogueError;
use crate::memory::SessionFacts;

/// Where the repair is. A suggestion the caller never confirmed cannot be
/// turned into either variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicketAddress {
    Resolved(ResolvedAddress),
    /// Not in the registry; a person has to check it.
    Unverified { as_spoken: String },
}

impl TicketAddress {
    pub fn display(&self) -> &str {
        match self {
            TicketAddress::Resolved(address) => address.full_address(),
            TicketAddress::Unverified { as_spoken } => as_spoken,
        }
    }
}

/// Everything a ticket system needs for one repair request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketRequest {
    pub call_id: Uuid,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: Option<String>,
    pub address: TicketAddress,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub manual_follow_up: bool,
}

impl TicketRequest {
    /// Build a request from gathered facts.
    ///
    /// Returns `None` until an issue and some address are known.
    pub fn from_facts(call_id: Uuid, facts: &SessionFacts) -> Option<Self> {
        let issue_type = facts.issue_type?;
        let resolution = facts.address.as_ref()?;
        let address = match resolution.matched() {
            Some(resolved) => TicketAddress::Resolved(resolved.clone()),
            None => TicketAddress::Unverified {
                as_spoken: resolution.ticket_address(),
            },
        };
        let manual_follow_up =
            facts.manual_follow_up || matches!(address, TicketAddress::Unverified { .. });

        Some(Self {
            call_id,
            issue_type,
            severity: facts.severity,
            description: facts.issue_description.clone(),
            address,
            caller_name: facts.caller_name.clone(),
            caller_phone: facts.caller_phone.clone(),
            manual_follow_up,
        })
    }
}

/// Result of a ticket attempt as reported back to the dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketOutcome {
    Created { ticket_id: String },
    Failed { reason: String },
}

/// Creates maintenance tickets.
#[async_trait]
pub trait TicketService: Send + Sync {
    /// Returns the new ticket id.
    async fn create_ticket(&self, request: &TicketRequest) -> Result<String, DialogueError>;
}

/// Sends fire-and-forget notifications. Implementations log their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, payload: serde_json::Value);
}

/// In-process ticket service issuing sequential `PREFIX-NNNNN` numbers.
#[derive(Debug)]
pub struct LocalTicketService {
    prefix: String,
    next: AtomicU32,
    issued: Mutex<Vec<(String, TicketRequest)>>,
}

impl LocalTicketService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU32::new(10_001),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Tickets issued so far.
    pub fn issued(&self) -> Result<Vec<(String, TicketRequest)>, DialogueError> {
        let issued = self
            .issued
            .lock()
            .map_err(|e| DialogueError::Storage(format!("Ticket log lock poisoned: {}", e)))?;
        Ok(issued.clone())
    }
}

#[async_trait]
impl TicketService for LocalTicketService {
    async fn create_ticket(&self, request: &TicketRequest) -> Result<String, DialogueError> {
        let number = self.next.fetch_add(1, Ordering::Relaxed);
        let ticket_id = format!("{}-{:05}", self.prefix, number);

        self.issued
            .lock()
            .map_err(|e| DialogueError::Storage(format!("Ticket log lock poisoned: {}", e)))?
            .push((ticket_id.clone(), request.clone()));

        info!(
            call_id = %request.call_id,
            ticket_id = %ticket_id,
            issue = %request.issue_type,
            severity = %request.severity,
            address = %request.address.display(),
            manual_follow_up = request.manual_follow_up,
            "Ticket created"
        );
        Ok(ticket_id)
    }
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: &str, payload: serde_json::Value) {
        info!(channel = %channel, payload = %payload, "Notification sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ConversationMemory;
    use tenantline_core::types::Utterance;
    use tenantline_registry::{AddressResolver, PropertyIndex, PropertyRecord};

    fn facts_with_address(address: &str) -> SessionFacts {
        let index = PropertyIndex::default();
        index
            .load(vec![PropertyRecord::new(28, "Alaska Street", None, "28 Alaska Street")])
            .unwrap();
        let mut memory = ConversationMemory::new();
        memory.record(Utterance::caller("the radiator is broken", 0.9));
        memory.offer_address(AddressResolver::default().resolve(address, &index));
        memory.summarize()
    }

    #[test]
    fn test_request_requires_issue_and_address() {
        let id = Uuid::new_v4();
        assert!(TicketRequest::from_facts(id, &SessionFacts::default()).is_none());

        let mut facts = facts_with_address("28 alaska street");
        facts.address = None;
        assert!(TicketRequest::from_facts(id, &facts).is_none());
    }

    #[test]
    fn test_request_with_resolved_address() {
        let facts = facts_with_address("28 alaska street");
        let request = TicketRequest::from_facts(Uuid::new_v4(), &facts).unwrap();
        assert_eq!(request.issue_type, IssueType::Heating);
        assert_eq!(request.address.display(), "28 Alaska Street");
        assert!(matches!(request.address, TicketAddress::Resolved(_)));
        assert!(!request.manual_follow_up);
    }

    #[test]
    fn test_unverified_address_needs_follow_up() {
        let facts = facts_with_address("12 nowhere lane");
        let request = TicketRequest::from_facts(Uuid::new_v4(), &facts).unwrap();
        assert!(matches!(request.address, TicketAddress::Unverified { .. }));
        assert_eq!(request.address.display(), "12 Nowhere");
        assert!(request.manual_follow_up);
    }

    #[tokio::test]
    async fn test_local_ticket_numbers() {
        let service = LocalTicketService::new("SV");
        let facts = facts_with_address("28 alaska street");
        let request = TicketRequest::from_facts(Uuid::new_v4(), &facts).unwrap();

        let first = service.create_ticket(&request).await.unwrap();
        let second = service.create_ticket(&request).await.unwrap();
        assert_eq!(first, "SV-10001");
        assert_eq!(second, "SV-10002");
        assert_eq!(service.issued().unwrap().len(), 2);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(TicketOutcome::Created {
            ticket_id: "SV-10001".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "created");
        assert_eq!(json["ticket_id"], "SV-10001");
    }
}
