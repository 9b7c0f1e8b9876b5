//! Pure domain models.

pub mod config;
pub mod conversation;
pub mod decision;
pub mod response;
pub mod trigger;
pub mod utterance;

pub use config::{
    AggregatorConfig, BusConfig, Config, DatabaseConfig, LoggingConfig, ModelConfig,
    ModeratorConfig, OrchestratorConfig, RetryConfig, SchedulerConfig, SessionConfig,
};
pub use conversation::{
    ContextView, ConversationSnapshot, ConversationState, EnrichedUtterance, RollingSummary,
    SummaryRecord, SynthesizedRecord, SynthesizedView, TopicState,
};
pub use decision::{
    Decision, DecisionPath, FactualError, ReplyMetadata, Severity, StuckSignal, TaskKind,
};
pub use response::{CandidateResponse, DecisionMeta, Priority, ResponseStatus};
pub use trigger::{TriggerKind, TriggerSignal, UtteranceSnapshot};
pub use utterance::{IngestRecord, Origin, Utterance};
