//! Ports to external collaborators.
//!
//! Everything the core cannot do by itself — language-model judgments,
//! durable persistence, the delivery side effect — sits behind one of these
//! traits. Implementations live in `infrastructure` and `cli`; unit tests
//! mock them.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{
    CandidateResponse, Decision, FactualError, StuckSignal, SummaryRecord, TaskKind, TopicState,
    TriggerSignal,
};

/// Context bundle handed to the perspective-generation capability.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveRequest {
    /// Rendered conversation context (summary + recent messages + history).
    pub context: String,

    /// Domains currently under discussion.
    pub active_domains: Vec<String>,

    /// Prior assistant contributions, rendered, to avoid repetition.
    pub history: String,

    pub task: TaskKind,
}

/// The external language-model capabilities, each returning a structured
/// judgment. Every method may fail; callers map failures to the conservative
/// default specific to the call site and never propagate.
#[async_trait]
pub trait Capabilities: Send + Sync {
    /// Extract 5-10 key concepts from a message.
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>>;

    /// Identify the disciplines active in a recent transcript.
    async fn infer_topics(&self, transcript: &str) -> Result<TopicState>;

    /// Fold new messages into the previous rolling summary.
    async fn summarize(&self, previous: &str, new_messages: &str) -> Result<String>;

    /// Is this utterance addressing the assistant persona directly?
    async fn detect_address(&self, speaker: &str, text: &str) -> Result<bool>;

    /// Does this utterance continue the assistant's last reply?
    async fn verify_follow_up(&self, speaker: &str, text: &str, last_reply: &str) -> Result<bool>;

    /// Choose a response path for a trigger.
    async fn decide(
        &self,
        signal: &TriggerSignal,
        context: &str,
        active_domains: &[String],
    ) -> Result<Decision>;

    /// Conservative scan for a serious factual error; `None` when clean.
    async fn detect_factual_error(&self, transcript: &str) -> Result<Option<FactualError>>;

    /// Conservative scan for a clear stuck signal; `None` when clean.
    async fn detect_stuck(&self, transcript: &str, history: &str) -> Result<Option<StuckSignal>>;

    /// Do two issue descriptions refer to the same underlying problem?
    async fn judge_similarity(&self, first: &str, second: &str) -> Result<bool>;

    /// Produce a short expert perspective for one domain.
    async fn perspective(&self, domain: &str, request: &PerspectiveRequest) -> Result<String>;
}

/// Durable, append-only store for completed summaries. Best-effort: the
/// aggregator logs failures and does not retry.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn append(&self, record: &SummaryRecord) -> Result<()>;
}

/// Delivery side effect for released responses.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, response: &CandidateResponse) -> Result<()>;
}
