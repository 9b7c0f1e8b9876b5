//! Colloquy - Live Conversation Moderator
//!
//! Colloquy ingests a timestamped utterance stream from a live multi-speaker
//! conversation, maintains rolling conversational context, decides when an
//! automated participant should intervene, generates candidate replies
//! through external language-model capabilities, and schedules delivery so
//! interventions feel timely but non-disruptive.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): pure models, typed errors, and the ports
//!   to external collaborators
//! - **Service Layer** (`services`): the conversational bus plus the three
//!   core subsystems — context aggregator, trigger detector + decision
//!   pipeline, and priority delivery scheduler — each a cooperative loop per
//!   session coordinating only through the bus
//! - **Infrastructure Layer** (`infrastructure`): model API client and
//!   capability adapter, configuration, logging, summary persistence
//! - **CLI Layer** (`cli`): the `run` and `check` commands and the console
//!   delivery sink

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    CandidateResponse, Config, ContextView, ConversationSnapshot, Decision, DecisionPath,
    Priority, ResponseStatus, TriggerKind, TriggerSignal, Utterance,
};
pub use domain::ports::{Capabilities, DeliverySink, SummaryStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ContextAggregator, ConversationBus, DeliveryScheduler, Orchestrator, SessionRegistry,
    TriggerDetector,
};
