//! Trigger signals emitted by the detector and consumed by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::utterance::Utterance;

/// What caused an intervention to be considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// A speaker addressed the assistant persona directly.
    Explicit,
    /// The background scan found a latent factual error.
    FactualError,
    /// The background scan found the team stuck.
    Stuck,
}

/// Snapshot of the utterance that fired a trigger. Kept small on purpose:
/// the full enriched context is read from the aggregator's published view
/// after the bounded wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtteranceSnapshot {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Utterance> for UtteranceSnapshot {
    fn from(utterance: &Utterance) -> Self {
        Self {
            speaker: utterance.speaker.clone(),
            text: utterance.text.clone(),
            timestamp: utterance.timestamp,
        }
    }
}

/// Transient trigger signal, consumed exactly once by the decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSignal {
    pub kind: TriggerKind,

    /// Sequence number of the triggering utterance.
    pub sequence: u64,

    pub utterance: UtteranceSnapshot,

    /// Set when the follow-up window was open at emission time. Provisional:
    /// the orchestrator verifies before treating the utterance as a
    /// continuation.
    #[serde(default)]
    pub potential_follow_up: bool,
}

impl TriggerSignal {
    pub fn explicit(utterance: &Utterance, potential_follow_up: bool) -> Self {
        Self {
            kind: TriggerKind::Explicit,
            sequence: utterance.sequence,
            utterance: utterance.into(),
            potential_follow_up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_signal_snapshots_utterance() {
        let utterance = Utterance::human(9, "alice", "sage, what is entropy?");
        let signal = TriggerSignal::explicit(&utterance, true);
        assert_eq!(signal.kind, TriggerKind::Explicit);
        assert_eq!(signal.sequence, 9);
        assert_eq!(signal.utterance.speaker, "alice");
        assert!(signal.potential_follow_up);
    }

    #[test]
    fn test_follow_up_flag_defaults_false() {
        let json = r#"{
            "kind": "explicit",
            "sequence": 1,
            "utterance": {"speaker": "a", "text": "t", "timestamp": "2026-01-01T00:00:00Z"}
        }"#;
        let signal: TriggerSignal = serde_json::from_str(json).unwrap();
        assert!(!signal.potential_follow_up);
    }
}
