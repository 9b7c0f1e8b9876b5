//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use colloquy::domain::models::{
    CandidateResponse, Decision, FactualError, StuckSignal, SummaryRecord, TopicState,
    TriggerSignal,
};
use colloquy::domain::ports::{Capabilities, DeliverySink, PerspectiveRequest, SummaryStore};

/// Deterministic capability implementation scripted per test.
///
/// Defaults are the conservative ones the real call sites fall back to:
/// nothing is addressed, nothing is detected, decisions continue monitoring.
pub struct ScriptedCapabilities {
    /// Substring that marks an utterance as addressing the assistant.
    pub wake_word: Option<String>,
    /// Decision returned for every trigger; `None` means continue.
    pub decision: Option<Decision>,
    /// Topics returned by inference; `None` leaves topics untouched.
    pub topics: Option<TopicState>,
    /// Text returned by the summarizer.
    pub summary: String,
    /// Detection returned by every factual-error scan.
    pub factual_error: Option<FactualError>,
    /// Detection returned by every stuck scan.
    pub stuck: Option<StuckSignal>,
    /// Verdict of the similarity oracle.
    pub similar: bool,
    /// Verdict of follow-up verification.
    pub follow_up: bool,
}

impl Default for ScriptedCapabilities {
    fn default() -> Self {
        Self {
            wake_word: None,
            decision: None,
            topics: None,
            summary: "a rolling summary".to_string(),
            factual_error: None,
            stuck: None,
            similar: false,
            follow_up: false,
        }
    }
}

#[async_trait]
impl Capabilities for ScriptedCapabilities {
    async fn extract_keywords(&self, _text: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn infer_topics(&self, _transcript: &str) -> Result<TopicState> {
        match &self.topics {
            Some(topics) => Ok(topics.clone()),
            None => Ok(TopicState::default()),
        }
    }

    async fn summarize(&self, _previous: &str, _new_messages: &str) -> Result<String> {
        Ok(self.summary.clone())
    }

    async fn detect_address(&self, _speaker: &str, text: &str) -> Result<bool> {
        Ok(self
            .wake_word
            .as_deref()
            .is_some_and(|word| text.to_lowercase().contains(word)))
    }

    async fn verify_follow_up(&self, _speaker: &str, _text: &str, _last: &str) -> Result<bool> {
        Ok(self.follow_up)
    }

    async fn decide(
        &self,
        _signal: &TriggerSignal,
        _context: &str,
        _active_domains: &[String],
    ) -> Result<Decision> {
        Ok(self
            .decision
            .clone()
            .unwrap_or_else(|| Decision::continue_monitoring("scripted default")))
    }

    async fn detect_factual_error(&self, _transcript: &str) -> Result<Option<FactualError>> {
        Ok(self.factual_error.clone())
    }

    async fn detect_stuck(&self, _transcript: &str, _history: &str) -> Result<Option<StuckSignal>> {
        Ok(self.stuck.clone())
    }

    async fn judge_similarity(&self, _first: &str, _second: &str) -> Result<bool> {
        Ok(self.similar)
    }

    async fn perspective(&self, domain: &str, _request: &PerspectiveRequest) -> Result<String> {
        Ok(format!("{domain} perspective on the question"))
    }
}

/// Summary store that records appended records in memory.
#[derive(Default)]
pub struct RecordingStore {
    records: Mutex<Vec<SummaryRecord>>,
}

impl RecordingStore {
    pub fn records(&self) -> Vec<SummaryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryStore for RecordingStore {
    async fn append(&self, record: &SummaryRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Delivery sink that records released responses in memory.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<CandidateResponse>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<CandidateResponse> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, response: &CandidateResponse) -> Result<()> {
        self.delivered.lock().unwrap().push(response.clone());
        Ok(())
    }
}
