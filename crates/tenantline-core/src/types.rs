use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Who produced an utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    System,
}

/// Maintenance issue taxonomy, declared in classification priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Heating,
    Electrical,
    Plumbing,
    Pest,
    Noise,
    Other,
}

impl IssueType {
    /// Phrase used when the issue is read back to the caller.
    pub fn spoken(&self) -> &'static str {
        match self {
            IssueType::Heating => "a heating issue",
            IssueType::Electrical => "an electrical issue",
            IssueType::Plumbing => "a plumbing issue",
            IssueType::Pest => "a pest problem",
            IssueType::Noise => "a noise complaint",
            IssueType::Other => "a maintenance issue",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueType::Heating => "heating",
            IssueType::Electrical => "electrical",
            IssueType::Plumbing => "plumbing",
            IssueType::Pest => "pest",
            IssueType::Noise => "noise",
            IssueType::Other => "other",
        };
        write!(f, "{}", label)
    }
}

/// Issue severity. Ordered so that `max` never downgrades.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Standard,
    Urgent,
    Emergency,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Standard => write!(f, "standard"),
            Severity::Urgent => write!(f, "urgent"),
            Severity::Emergency => write!(f, "emergency"),
        }
    }
}

/// A required fact gating workflow progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Issue,
    Address,
    Name,
    Phone,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Issue => write!(f, "issue"),
            Slot::Address => write!(f, "address"),
            Slot::Name => write!(f, "name"),
            Slot::Phone => write!(f, "phone"),
        }
    }
}

/// Three-way outcome of resolving a spoken address against the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    Unverified,
    Ambiguous,
    Exact,
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressStatus::Exact => write!(f, "exact"),
            AddressStatus::Ambiguous => write!(f, "ambiguous"),
            AddressStatus::Unverified => write!(f, "unverified"),
        }
    }
}

/// Caller-information workflow state.
///
/// CollectingIssue -> CollectingAddress -> [ConfirmingAddress] -> CollectingName
/// -> CollectingPhone -> Ready -> Completed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    CollectingIssue,
    CollectingAddress,
    ConfirmingAddress,
    CollectingName,
    CollectingPhone,
    Ready,
    Completed,
}

impl WorkflowState {
    /// The slot this state is waiting on, if any.
    pub fn pending_slot(&self) -> Option<Slot> {
        match self {
            WorkflowState::CollectingIssue => Some(Slot::Issue),
            WorkflowState::CollectingAddress | WorkflowState::ConfirmingAddress => {
                Some(Slot::Address)
            }
            WorkflowState::CollectingName => Some(Slot::Name),
            WorkflowState::CollectingPhone => Some(Slot::Phone),
            WorkflowState::Ready | WorkflowState::Completed => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::CollectingIssue => write!(f, "CollectingIssue"),
            WorkflowState::CollectingAddress => write!(f, "CollectingAddress"),
            WorkflowState::ConfirmingAddress => write!(f, "ConfirmingAddress"),
            WorkflowState::CollectingName => write!(f, "CollectingName"),
            WorkflowState::CollectingPhone => write!(f, "CollectingPhone"),
            WorkflowState::Ready => write!(f, "Ready"),
            WorkflowState::Completed => write!(f, "Completed"),
        }
    }
}

// =============================================================================
// Value types
// =============================================================================

/// Unix timestamp in seconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

/// One transcribed turn, caller or system. Append-only once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: Timestamp,
    /// Speech-to-text confidence in 0.0 - 1.0. System utterances carry 1.0.
    pub confidence: f32,
}

impl Utterance {
    pub fn caller(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            speaker: Speaker::Caller,
            text: text.into(),
            timestamp: Timestamp::now(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            timestamp: Timestamp::now(),
            confidence: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Emergency > Severity::Urgent);
        assert!(Severity::Urgent > Severity::Standard);
        assert_eq!(Severity::Standard.max(Severity::Emergency), Severity::Emergency);
    }

    #[test]
    fn test_address_status_ordering() {
        assert!(AddressStatus::Exact > AddressStatus::Ambiguous);
        assert!(AddressStatus::Ambiguous > AddressStatus::Unverified);
    }

    #[test]
    fn test_issue_type_display_and_spoken() {
        assert_eq!(IssueType::Heating.to_string(), "heating");
        assert_eq!(IssueType::Pest.spoken(), "a pest problem");
    }

    #[test]
    fn test_issue_type_serde() {
        let json = serde_json::to_string(&IssueType::Plumbing).unwrap();
        assert_eq!(json, "\"plumbing\"");
        let back: IssueType = serde_json::from_str("\"noise\"").unwrap();
        assert_eq!(back, IssueType::Noise);
    }

    #[test]
    fn test_pending_slot() {
        assert_eq!(WorkflowState::CollectingIssue.pending_slot(), Some(Slot::Issue));
        assert_eq!(
            WorkflowState::ConfirmingAddress.pending_slot(),
            Some(Slot::Address)
        );
        assert_eq!(WorkflowState::Ready.pending_slot(), None);
    }

    #[test]
    fn test_workflow_state_default_and_display() {
        assert_eq!(WorkflowState::default(), WorkflowState::CollectingIssue);
        assert_eq!(WorkflowState::CollectingPhone.to_string(), "CollectingPhone");
    }

    #[test]
    fn test_utterance_constructors() {
        let caller = Utterance::caller("hello", 1.7);
        assert_eq!(caller.speaker, Speaker::Caller);
        assert_eq!(caller.confidence, 1.0);

        let system = Utterance::system("Hi there");
        assert_eq!(system.speaker, Speaker::System);
        assert_eq!(system.text, "Hi there");
    }

    #[test]
    fn test_timestamp_datetime_roundtrip() {
        let ts = Timestamp(1_700_000_000);
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()), ts);
    }
}
