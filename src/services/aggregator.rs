//! Context aggregator: turns the utterance stream into windowed, summarized,
//! topic-tagged conversational state.
//!
//! Runs as one cooperative loop per session. Every iteration absorbs at most
//! one queued message, then evaluates the topic-inference and summarization
//! policies and republishes state to the bus — so the time-window policies
//! fire on idle ticks too, not only when a message arrives.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::models::{
    AggregatorConfig, BusConfig, ContextView, ConversationState, EnrichedUtterance, Origin,
    SessionConfig, SynthesizedRecord, Utterance,
};
use crate::domain::ports::{Capabilities, SummaryStore};
use crate::services::bus::{keys, ConversationBus};
use crate::services::registry::SessionRegistry;

/// Texts shorter than this skip keyword extraction entirely.
const MIN_ENRICHMENT_LEN: usize = 10;

/// Fallback keyword heuristic bounds: words longer than four characters,
/// first five of them.
const FALLBACK_MIN_WORD_LEN: usize = 4;
const FALLBACK_MAX_KEYWORDS: usize = 5;

/// Messages from the tail of the buffer shown to topic inference.
const TOPIC_INFERENCE_TAIL: usize = 10;

pub struct ContextAggregator {
    bus: Arc<ConversationBus>,
    capabilities: Arc<dyn Capabilities>,
    store: Arc<dyn SummaryStore>,
    config: AggregatorConfig,
    bus_config: BusConfig,
    session_config: SessionConfig,
    sessions: SessionRegistry<ConversationState>,
}

impl ContextAggregator {
    pub fn new(
        bus: Arc<ConversationBus>,
        capabilities: Arc<dyn Capabilities>,
        store: Arc<dyn SummaryStore>,
        config: AggregatorConfig,
        bus_config: BusConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            bus,
            capabilities,
            store,
            config,
            bus_config,
            session_config,
            sessions: SessionRegistry::new(),
        }
    }

    /// Cooperative per-session loop: blocking pop with a short timeout so
    /// shutdown and the time-window policies are checked between waits. One
    /// bad cycle never stops subsequent cycles.
    pub async fn run(&self, session_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(
            session_id,
            summary_window_secs = self.config.summary_window_secs,
            topic_message_interval = self.config.topic_message_interval,
            "context aggregator started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let message: Option<Utterance> = self
                .bus
                .pop_wait(&keys::context(session_id), self.config.poll_interval())
                .await;

            if let Some(utterance) = message {
                let result = match utterance.origin {
                    Origin::Human => self.ingest(session_id, utterance).await,
                    Origin::Synthesized => self.record_synthesized(session_id, utterance).await,
                };
                if let Err(err) = result {
                    warn!(session_id, %err, "failed to absorb message");
                }
            }

            self.maybe_infer_topics(session_id).await;
            self.maybe_summarize(session_id).await;
            self.publish_state(session_id);
            self.sessions.evict_idle(self.session_config.idle_evict());
        }

        info!(session_id, "context aggregator stopped");
    }

    /// Appends a human utterance to the buffer after enrichment.
    pub async fn ingest(&self, session_id: &str, utterance: Utterance) -> Result<()> {
        let sequence = utterance.sequence;
        let enriched = self.enrich(utterance).await;
        let buffer_len = self.with_state(session_id, |state| {
            state.push_buffered(enriched.clone());
            state.buffer.len()
        });
        debug!(session_id, sequence, buffer_len, "utterance buffered");
        Ok(())
    }

    /// Records a synthesized reply into the append-only history and the
    /// buffer, so later context includes it. Never routed through trigger
    /// detection — callers distinguish origin by tag.
    pub async fn record_synthesized(&self, session_id: &str, utterance: Utterance) -> Result<()> {
        let record = SynthesizedRecord {
            sequence: utterance.sequence,
            text: utterance.text.clone(),
            timestamp: utterance.timestamp,
            issue: utterance
                .metadata
                .as_ref()
                .and_then(|meta| meta.issue.clone()),
            domains: utterance
                .metadata
                .as_ref()
                .map(|meta| meta.domains.clone())
                .unwrap_or_default(),
            recorded_at: Instant::now(),
        };

        let enriched = self.enrich(utterance).await;
        let history_len = self.with_state(session_id, |state| {
            state.push_synthesized(record.clone());
            state.push_buffered(enriched.clone());
            state.synthesized.len()
        });
        debug!(session_id, sequence = record.sequence, history_len, "synthesized reply recorded");
        Ok(())
    }

    /// Keyword enrichment with a degrade path: short texts get nothing, a
    /// failed capability call gets the longest-words heuristic.
    async fn enrich(&self, utterance: Utterance) -> EnrichedUtterance {
        let keywords = if utterance.text.trim().len() < MIN_ENRICHMENT_LEN {
            Vec::new()
        } else {
            match self.capabilities.extract_keywords(&utterance.text).await {
                Ok(keywords) => keywords,
                Err(err) => {
                    warn!(%err, "keyword extraction failed, using heuristic fallback");
                    fallback_keywords(&utterance.text)
                }
            }
        };
        EnrichedUtterance::new(utterance, keywords)
    }

    /// Topic inference: message-count or elapsed-time policy, whichever fires
    /// first. On failure the previous topics stay in place — stale topic data
    /// rather than none.
    pub async fn maybe_infer_topics(&self, session_id: &str) {
        let transcript = self.with_state(session_id, |state| {
            if !state.should_infer_topics(
                self.config.topic_message_interval,
                self.config.topic_time_interval(),
            ) {
                return None;
            }
            let tail = state
                .buffer
                .iter()
                .rev()
                .take(TOPIC_INFERENCE_TAIL)
                .rev()
                .map(|m| format!("{}: {}", m.utterance.speaker, m.utterance.text))
                .collect::<Vec<_>>()
                .join("\n");
            Some(tail)
        });

        let Some(transcript) = transcript else { return };

        match self.capabilities.infer_topics(&transcript).await {
            Ok(topics) => {
                let tagged = self.with_state(session_id, |state| state.apply_topics(topics));
                debug!(session_id, tagged, "topics replaced, buffer back-tagged");
            }
            Err(err) => warn!(session_id, %err, "topic inference failed, keeping prior topics"),
        }
    }

    /// Summarization: fires purely on elapsed time since the oldest buffered
    /// utterance. On failure the buffer is retained and the cycle repeats
    /// with unchanged inputs next tick.
    pub async fn maybe_summarize(&self, session_id: &str) {
        let inputs = self.with_state(session_id, |state| {
            if !state.should_summarize(self.config.summary_window()) {
                return None;
            }
            let new_messages = state
                .buffer
                .iter()
                .map(|m| {
                    format!(
                        "[{}] {}: {}",
                        m.utterance.timestamp, m.utterance.speaker, m.utterance.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            Some((state.summary.text.clone(), new_messages, state.buffer.len()))
        });

        let Some((previous, new_messages, buffered)) = inputs else {
            return;
        };
        info!(session_id, buffered, "summarization window elapsed");

        match self.capabilities.summarize(&previous, &new_messages).await {
            Ok(text) => {
                let record =
                    self.with_state(session_id, |state| state.absorb_summary(text.clone()));
                if let Some(record) = record {
                    info!(
                        session_id,
                        covers_start = record.covers_start,
                        covers_end = record.covers_end,
                        "summary absorbed, buffer cleared"
                    );
                    if let Err(err) = self
                        .store
                        .append(&record)
                        .await
                        .context("summary persistence failed")
                    {
                        warn!(session_id, %err, "summary not persisted");
                    }
                }
            }
            Err(err) => {
                warn!(session_id, %err, "summarization failed, buffer retained for retry");
            }
        }
    }

    /// Publishes the full context view and the derived silence snapshot to
    /// the bus, each with its own TTL.
    pub fn publish_state(&self, session_id: &str) {
        let (view, snapshot) = self.with_state(session_id, |state| {
            (
                state.context_view(self.config.synthesized_view_limit),
                state.snapshot(self.config.silence_threshold()),
            )
        });
        if let Err(err) = self
            .bus
            .put(&keys::state(session_id), &view, self.bus_config.state_ttl())
        {
            warn!(session_id, %err, "failed to publish context view");
        }
        if let Err(err) = self.bus.put(
            &keys::snapshot(session_id),
            &snapshot,
            self.bus_config.snapshot_ttl(),
        ) {
            warn!(session_id, %err, "failed to publish silence snapshot");
        }
    }

    /// Immutable read view of the current state, for callers inside the
    /// process; bus consumers read the published copy.
    pub fn view(&self, session_id: &str) -> ContextView {
        self.with_state(session_id, |state| {
            state.context_view(self.config.synthesized_view_limit)
        })
    }

    pub fn is_silent(&self, session_id: &str) -> bool {
        self.with_state(session_id, |state| {
            state.is_silent(self.config.silence_threshold())
        })
    }

    pub fn time_since_last(&self, session_id: &str) -> std::time::Duration {
        self.with_state(session_id, |state| state.time_since_last())
    }

    fn with_state<R>(&self, session_id: &str, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        self.sessions
            .with_session(session_id, || ConversationState::new(session_id), f)
    }
}

/// Longest-words fallback when keyword extraction is unavailable.
fn fallback_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|word| word.len() > FALLBACK_MIN_WORD_LEN)
        .take(FALLBACK_MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}
