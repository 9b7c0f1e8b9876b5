//! Per-session conversational state owned by the context aggregator.
//!
//! The state splits into whole-replace fields (summary, topics) and
//! append-only fields (buffer, synthesized history), so concurrent readers
//! working from published views never observe partial mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::utterance::Utterance;

/// An utterance enriched with extracted keywords and back-tagged domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedUtterance {
    #[serde(flatten)]
    pub utterance: Utterance,

    /// Keywords extracted at ingest time (capability or heuristic fallback).
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Domains tagged by the first inference cycle after ingest. Tagged once,
    /// never re-tagged.
    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub domain_confidence: HashMap<String, f64>,

    /// Monotonic arrival instant, drives the summarization window.
    #[serde(skip, default = "Instant::now")]
    pub buffered_at: Instant,
}

impl EnrichedUtterance {
    pub fn new(utterance: Utterance, keywords: Vec<String>) -> Self {
        Self {
            utterance,
            keywords,
            domains: Vec::new(),
            domain_confidence: HashMap::new(),
            buffered_at: Instant::now(),
        }
    }
}

/// Rolling summary of everything absorbed out of the buffer so far.
/// Replaced wholesale on each summarization cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    pub text: String,

    /// Inclusive sequence-number range covered, `(0, 0)` before the first
    /// cycle.
    pub covers_messages: (u64, u64),

    /// Total messages absorbed across all cycles.
    pub message_count: usize,

    pub time_range_start: Option<DateTime<Utc>>,
    pub time_range_end: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Active domains and topic keywords. Replaced wholesale on each inference
/// cycle; a failed cycle leaves the previous state in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicState {
    pub domains: Vec<String>,

    #[serde(default)]
    pub confidence: HashMap<String, f64>,

    pub keywords: Vec<String>,
}

/// One entry in the append-only synthesized-reply log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedRecord {
    pub sequence: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,

    /// Deduplication key carried over from the reply metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,

    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(skip, default = "Instant::now")]
    pub recorded_at: Instant,
}

/// Full per-session state. One instance per session, owned by the
/// aggregator's session registry.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: String,
    pub summary: RollingSummary,
    pub buffer: Vec<EnrichedUtterance>,
    pub synthesized: Vec<SynthesizedRecord>,
    pub topics: TopicState,

    /// Total utterances ever ingested (human and synthesized).
    pub total_ingested: u64,

    messages_since_inference: usize,
    last_inference_at: Instant,
    last_message_at: Instant,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.into(),
            summary: RollingSummary::default(),
            buffer: Vec::new(),
            synthesized: Vec::new(),
            topics: TopicState::default(),
            total_ingested: 0,
            messages_since_inference: 0,
            last_inference_at: now,
            last_message_at: now,
        }
    }

    /// Appends an enriched utterance to the buffer and bumps the counters
    /// feeding the inference and silence policies.
    pub fn push_buffered(&mut self, enriched: EnrichedUtterance) {
        self.buffer.push(enriched);
        self.total_ingested += 1;
        self.messages_since_inference += 1;
        self.last_message_at = Instant::now();
    }

    /// Appends to the synthesized-reply log. The caller separately buffers
    /// the reply via `push_buffered` so later context includes it.
    pub fn push_synthesized(&mut self, record: SynthesizedRecord) {
        self.synthesized.push(record);
    }

    pub fn time_since_last(&self) -> Duration {
        self.last_message_at.elapsed()
    }

    pub fn is_silent(&self, threshold: Duration) -> bool {
        self.time_since_last() > threshold
    }

    /// Topic inference fires on message count or elapsed time, whichever
    /// comes first, provided there is anything to look at.
    pub fn should_infer_topics(
        &self,
        message_interval: usize,
        time_interval: Duration,
    ) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.messages_since_inference >= message_interval
            || self.last_inference_at.elapsed() >= time_interval
    }

    /// Replaces the topic state wholesale and back-tags any buffered
    /// utterance that has not been tagged yet (first-inference-wins).
    /// Returns the number of newly tagged utterances.
    pub fn apply_topics(&mut self, topics: TopicState) -> usize {
        let mut tagged = 0;
        for entry in &mut self.buffer {
            if entry.domains.is_empty() {
                entry.domains = topics.domains.clone();
                entry.domain_confidence = topics.confidence.clone();
                tagged += 1;
            }
        }
        self.topics = topics;
        self.messages_since_inference = 0;
        self.last_inference_at = Instant::now();
        tagged
    }

    /// Summarization fires purely on elapsed time since the oldest buffered
    /// utterance; buffer size plays no role.
    pub fn should_summarize(&self, window: Duration) -> bool {
        self.buffer
            .first()
            .is_some_and(|oldest| oldest.buffered_at.elapsed() >= window)
    }

    /// Applies a successful summarization: coverage extends additively, the
    /// buffer clears atomically. Returns the record to persist, or `None`
    /// when there was nothing buffered.
    pub fn absorb_summary(&mut self, text: String) -> Option<SummaryRecord> {
        let (first_sequence, first_timestamp) = self
            .buffer
            .first()
            .map(|m| (m.utterance.sequence, m.utterance.timestamp))?;
        let (last_sequence, last_timestamp) = self
            .buffer
            .last()
            .map(|m| (m.utterance.sequence, m.utterance.timestamp))?;

        let covers_start = if self.summary.message_count == 0 {
            first_sequence
        } else {
            self.summary.covers_messages.0
        };

        self.summary = RollingSummary {
            text,
            covers_messages: (covers_start, last_sequence),
            message_count: self.summary.message_count + self.buffer.len(),
            time_range_start: self.summary.time_range_start.or(Some(first_timestamp)),
            time_range_end: Some(last_timestamp),
            last_updated: Some(Utc::now()),
        };
        self.buffer.clear();

        Some(SummaryRecord {
            session_id: self.session_id.clone(),
            text: self.summary.text.clone(),
            covers_start: self.summary.covers_messages.0,
            covers_end: self.summary.covers_messages.1,
            message_count: self.summary.message_count,
            time_range_start: self.summary.time_range_start,
            time_range_end: self.summary.time_range_end,
            domains: self.topics.domains.clone(),
        })
    }

    /// Read-only projection published to the bus for the orchestrator.
    pub fn context_view(&self, synthesized_limit: usize) -> ContextView {
        let synthesized = self
            .synthesized
            .iter()
            .rev()
            .take(synthesized_limit)
            .rev()
            .map(|record| SynthesizedView {
                sequence: record.sequence,
                text: record.text.clone(),
                timestamp: record.timestamp,
                issue: record.issue.clone(),
                age_secs: record.recorded_at.elapsed().as_secs_f64(),
            })
            .collect();

        ContextView {
            session_id: self.session_id.clone(),
            summary: self.summary.clone(),
            buffer: self.buffer.clone(),
            synthesized,
            domains: self.topics.domains.clone(),
            keywords: self.topics.keywords.clone(),
        }
    }

    /// Derived silence/topic blob published for the scheduler.
    pub fn snapshot(&self, silence_threshold: Duration) -> ConversationSnapshot {
        ConversationSnapshot {
            session_id: self.session_id.clone(),
            silent: self.is_silent(silence_threshold),
            seconds_since_last: self.time_since_last().as_secs_f64(),
            domains: self.topics.domains.clone(),
            keywords: self.topics.keywords.clone(),
        }
    }
}

/// Immutable projection of `ConversationState` for consumers on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextView {
    pub session_id: String,
    pub summary: RollingSummary,
    pub buffer: Vec<EnrichedUtterance>,
    pub synthesized: Vec<SynthesizedView>,
    pub domains: Vec<String>,
    pub keywords: Vec<String>,
}

impl ContextView {
    /// An empty view, used when a session has published no state yet.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            summary: RollingSummary::default(),
            buffer: Vec::new(),
            synthesized: Vec::new(),
            domains: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Count of buffered messages newer than the given sequence number.
    /// Used by the orchestrator's bounded wait-for-more-context.
    pub fn messages_after(&self, sequence: u64) -> usize {
        self.buffer
            .iter()
            .filter(|m| m.utterance.sequence > sequence)
            .count()
    }

    pub fn find_buffered(&self, sequence: u64) -> Option<&EnrichedUtterance> {
        self.buffer
            .iter()
            .find(|m| m.utterance.sequence == sequence)
    }

    pub fn last_synthesized(&self) -> Option<&SynthesizedView> {
        self.synthesized.last()
    }

    /// Renders the view into the text bundle handed to the decision and
    /// perspective capabilities: summary, then recent messages with their
    /// domain tags, then prior assistant contributions.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if !self.summary.text.is_empty() {
            parts.push("=== PRIOR DISCUSSION (SUMMARIZED) ===".to_string());
            parts.push(self.summary.text.clone());
            parts.push(String::new());
        }

        if !self.buffer.is_empty() {
            parts.push("=== RECENT MESSAGES ===".to_string());
            for entry in &self.buffer {
                let domains = if entry.domains.is_empty() {
                    String::new()
                } else {
                    format!(" [domains: {}]", entry.domains.join(", "))
                };
                parts.push(format!(
                    "{}: {}{}",
                    entry.utterance.speaker, entry.utterance.text, domains
                ));
            }
            parts.push(String::new());
        }

        if !self.synthesized.is_empty() {
            parts.push("=== PRIOR ASSISTANT CONTRIBUTIONS ===".to_string());
            for record in &self.synthesized {
                let preview: String = record.text.chars().take(100).collect();
                parts.push(format!("[{}] {}", record.timestamp, preview));
            }
        }

        parts.join("\n")
    }

    /// Plain transcript of the buffer, one line per message.
    pub fn transcript(&self) -> String {
        self.buffer
            .iter()
            .map(|m| format!("{}: {}", m.utterance.speaker, m.utterance.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Synthesized-reply entry as exposed in a context view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedView {
    pub sequence: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,

    /// Seconds since the reply was recorded, computed at snapshot time.
    pub age_secs: f64,
}

/// Silence/topic snapshot consumed by the delivery scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub session_id: String,
    pub silent: bool,
    pub seconds_since_last: f64,
    pub domains: Vec<String>,
    pub keywords: Vec<String>,
}

/// Append-only record emitted to the durable summary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub session_id: String,
    pub text: String,
    pub covers_start: u64,
    pub covers_end: u64,
    pub message_count: usize,
    pub time_range_start: Option<DateTime<Utc>>,
    pub time_range_end: Option<DateTime<Utc>>,
    pub domains: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enriched(sequence: u64, text: &str) -> EnrichedUtterance {
        EnrichedUtterance::new(Utterance::human(sequence, "alice", text), vec![])
    }

    #[test]
    fn test_push_buffered_updates_counters() {
        let mut state = ConversationState::new("s1");
        state.push_buffered(enriched(1, "hello"));
        state.push_buffered(enriched(2, "world"));
        assert_eq!(state.buffer.len(), 2);
        assert_eq!(state.total_ingested, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_detection() {
        let mut state = ConversationState::new("s1");
        state.push_buffered(enriched(1, "hello"));
        assert!(!state.is_silent(Duration::from_secs(4)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(state.is_silent(Duration::from_secs(4)));
        assert!(state.time_since_last() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_inference_policy_count_or_time() {
        let mut state = ConversationState::new("s1");
        assert!(!state.should_infer_topics(5, Duration::from_secs(30)));

        for seq in 1..=5 {
            state.push_buffered(enriched(seq, "msg"));
        }
        assert!(state.should_infer_topics(5, Duration::from_secs(30)));

        state.apply_topics(TopicState::default());
        assert!(!state.should_infer_topics(5, Duration::from_secs(30)));

        state.push_buffered(enriched(6, "msg"));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(state.should_infer_topics(5, Duration::from_secs(30)));
    }

    #[test]
    fn test_apply_topics_tags_once() {
        let mut state = ConversationState::new("s1");
        state.push_buffered(enriched(1, "a"));
        state.push_buffered(enriched(2, "b"));

        let first = TopicState {
            domains: vec!["Biology".into()],
            confidence: HashMap::new(),
            keywords: vec!["dna".into()],
        };
        assert_eq!(state.apply_topics(first), 2);

        state.push_buffered(enriched(3, "c"));
        let second = TopicState {
            domains: vec!["Chemistry".into()],
            confidence: HashMap::new(),
            keywords: vec!["bonds".into()],
        };
        // Only the untagged third message picks up the new domains.
        assert_eq!(state.apply_topics(second), 1);
        assert_eq!(state.buffer[0].domains, vec!["Biology".to_string()]);
        assert_eq!(state.buffer[2].domains, vec!["Chemistry".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_window_is_time_only() {
        let mut state = ConversationState::new("s1");
        let window = Duration::from_secs(120);
        assert!(!state.should_summarize(window));

        for seq in 1..=16 {
            state.push_buffered(enriched(seq, "msg"));
        }
        tokio::time::advance(Duration::from_secs(70)).await;
        assert!(!state.should_summarize(window), "16 messages in 70s must not trigger");

        tokio::time::advance(Duration::from_secs(51)).await;
        assert!(state.should_summarize(window));
    }

    #[test]
    fn test_absorb_summary_extends_coverage_and_clears() {
        let mut state = ConversationState::new("s1");
        state.push_buffered(enriched(3, "a"));
        state.push_buffered(enriched(7, "b"));

        let record = state.absorb_summary("first summary".into()).unwrap();
        assert_eq!(record.covers_start, 3);
        assert_eq!(record.covers_end, 7);
        assert_eq!(state.summary.covers_messages, (3, 7));
        assert_eq!(state.summary.message_count, 2);
        assert!(state.buffer.is_empty());

        state.push_buffered(enriched(8, "c"));
        let record = state.absorb_summary("second summary".into()).unwrap();
        // Coverage start stays pinned, end extends.
        assert_eq!(record.covers_start, 3);
        assert_eq!(record.covers_end, 8);
        assert_eq!(state.summary.message_count, 3);
    }

    #[test]
    fn test_context_view_limits_synthesized_history() {
        let mut state = ConversationState::new("s1");
        for sequence in 1..=8 {
            state.push_synthesized(SynthesizedRecord {
                sequence,
                text: format!("reply {sequence}"),
                timestamp: Utc::now(),
                issue: None,
                domains: vec![],
                recorded_at: Instant::now(),
            });
        }
        let view = state.context_view(5);
        assert_eq!(view.synthesized.len(), 5);
        assert_eq!(view.synthesized[0].sequence, 4);
        assert_eq!(view.last_synthesized().unwrap().sequence, 8);
    }

    #[test]
    fn test_view_messages_after() {
        let mut state = ConversationState::new("s1");
        for seq in [4, 5, 9] {
            state.push_buffered(enriched(seq, "m"));
        }
        let view = state.context_view(5);
        assert_eq!(view.messages_after(4), 2);
        assert_eq!(view.messages_after(9), 0);
        assert!(view.find_buffered(5).is_some());
    }
}
