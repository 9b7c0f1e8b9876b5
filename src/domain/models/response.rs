//! Candidate responses and the priority tiers that gate their delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::trigger::TriggerKind;

/// Delivery urgency class. P0 bypasses silence gating entirely; P1-P3 are
/// gated and carry increasingly relaxed soft deadlines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Priority {
    #[default]
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    /// All tiers, highest urgency first.
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

    /// The gated tiers scanned during silence windows, in scan order.
    pub const GATED: [Priority; 3] = [Priority::P1, Priority::P2, Priority::P3];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal and non-terminal states of a candidate response.
///
/// A response moves from `Queued` to exactly one terminal state, chosen by
/// the scheduler; it is never re-queued afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    Delivered,
    Expired,
    DroppedIrrelevant,
    DroppedDuplicate,
}

/// Decision metadata carried alongside a queued response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMeta {
    #[serde(default)]
    pub active_domains: Vec<String>,

    #[serde(default)]
    pub missing_domains: Vec<String>,

    /// Deduplication key for the issue this response addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,

    /// Keywords checked against the active topic set at delivery time.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A generated reply waiting for a delivery slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResponse {
    pub id: Uuid,
    pub session_id: String,
    pub priority: Priority,
    pub text: String,
    pub created_at: DateTime<Utc>,

    /// What caused this response to be generated.
    pub trigger: TriggerKind,

    /// Sequence number of the triggering utterance, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_sequence: Option<u64>,

    pub decision: DecisionMeta,
    pub status: ResponseStatus,
}

impl CandidateResponse {
    pub fn new(
        session_id: impl Into<String>,
        priority: Priority,
        text: impl Into<String>,
        trigger: TriggerKind,
        trigger_sequence: Option<u64>,
        decision: DecisionMeta,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            priority,
            text: text.into(),
            created_at: Utc::now(),
            trigger,
            trigger_sequence,
            decision,
            status: ResponseStatus::Queued,
        }
    }

    /// Age of the response relative to `now`. Saturates to zero for clock
    /// skew between producer and scheduler.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// True when the response keywords share at least one entry with the
    /// active topic keywords. Either set being empty passes by default so
    /// that early, pre-inference items are never starved.
    pub fn is_relevant_to(&self, active_keywords: &[String]) -> bool {
        if active_keywords.is_empty() || self.decision.keywords.is_empty() {
            return true;
        }
        self.decision
            .keywords
            .iter()
            .any(|k| active_keywords.iter().any(|a| a == k))
    }
}
