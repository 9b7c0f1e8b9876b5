//! Decision and detection shapes returned by the external capabilities.
//!
//! These mirror the structured judgments the pipeline asks for: the decision
//! path for a trigger, the conservative background detections, and the
//! metadata attached to synthesized replies for deduplication.

use serde::{Deserialize, Serialize};

use super::response::Priority;

/// Response path chosen by the decision capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// Keep monitoring, no reply warranted.
    #[default]
    Continue,
    /// Generate a multi-perspective reply.
    Respond,
    /// Ask the speakers to repeat or clarify.
    Clarify,
}

/// Kind of generation task handed to the perspective capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    ProvidePerspective,
    TranslateJargon,
    FillGap,
    FactualCorrection,
    /// Marker for fixed clarification replies; never handed to the
    /// perspective capability.
    Clarification,
}

/// Structured decision for a trigger signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub path: DecisionPath,

    #[serde(default)]
    pub reasoning: String,

    /// Subjects currently under discussion.
    #[serde(default)]
    pub active_domains: Vec<String>,

    /// Expert perspectives missing from the conversation. Must be non-empty
    /// on the respond path; an empty list is treated as a malformed decision
    /// and degraded to clarification.
    #[serde(default)]
    pub missing_domains: Vec<String>,

    /// Urgency score 0-10.
    #[serde(default)]
    pub urgency: u8,

    #[serde(default)]
    pub task: TaskKind,
}

impl Decision {
    /// Conservative default used when the capability fails: continue
    /// monitoring, take no action.
    pub fn continue_monitoring(reason: impl Into<String>) -> Self {
        Self {
            path: DecisionPath::Continue,
            reasoning: reason.into(),
            active_domains: Vec::new(),
            missing_domains: Vec::new(),
            urgency: 0,
            task: TaskKind::ProvidePerspective,
        }
    }
}

/// Severity reported by the background detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// A latent factual error found by the background scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactualError {
    pub description: String,

    /// What should have been said instead.
    pub correction: String,

    #[serde(default)]
    pub severity: Severity,

    /// Expert domains needed to address the error.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Human-readable issue description used as the deduplication key.
    pub issue: String,
}

/// A "team is stuck" signal found by the background scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckSignal {
    /// Signal category (repeated questions, explicit uncertainty, ...).
    #[serde(default)]
    pub kind: String,

    pub description: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub domains: Vec<String>,

    /// Deduplication key.
    pub issue: String,
}

impl StuckSignal {
    /// Stuck interventions are gated lower than factual corrections; only
    /// low-severity signals drop to the bottom tier.
    pub fn priority(&self) -> Priority {
        match self.severity {
            Severity::Low => Priority::P3,
            Severity::Medium | Severity::High => Priority::P2,
        }
    }
}

/// Metadata attached to a synthesized reply when it is recorded back into
/// conversational context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    /// Priority the reply was queued at.
    #[serde(default)]
    pub priority: Priority,

    /// Domains the reply drew on.
    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub task: TaskKind,

    /// Deduplication key, when the reply addressed a nameable issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}
