//! Shared test doubles for the service unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mockall::mock;
use std::sync::Mutex;

use crate::domain::models::{
    CandidateResponse, Decision, FactualError, StuckSignal, SummaryRecord, TopicState,
    TriggerSignal,
};
use crate::domain::ports::{Capabilities, DeliverySink, PerspectiveRequest, SummaryStore};

mock! {
    pub Caps {}

    #[async_trait]
    impl Capabilities for Caps {
        async fn extract_keywords(&self, text: &str) -> Result<Vec<String>>;
        async fn infer_topics(&self, transcript: &str) -> Result<TopicState>;
        async fn summarize(&self, previous: &str, new_messages: &str) -> Result<String>;
        async fn detect_address(&self, speaker: &str, text: &str) -> Result<bool>;
        async fn verify_follow_up(
            &self,
            speaker: &str,
            text: &str,
            last_reply: &str,
        ) -> Result<bool>;
        async fn decide(
            &self,
            signal: &TriggerSignal,
            context: &str,
            active_domains: &[String],
        ) -> Result<Decision>;
        async fn detect_factual_error(&self, transcript: &str) -> Result<Option<FactualError>>;
        async fn detect_stuck(
            &self,
            transcript: &str,
            history: &str,
        ) -> Result<Option<StuckSignal>>;
        async fn judge_similarity(&self, first: &str, second: &str) -> Result<bool>;
        async fn perspective(&self, domain: &str, request: &PerspectiveRequest) -> Result<String>;
    }
}

/// A mock where every capability call fails, for exercising the fail-open
/// paths.
pub fn failing_capabilities() -> MockCaps {
    let mut caps = MockCaps::new();
    caps.expect_extract_keywords()
        .returning(|_| Err(anyhow!("capability offline")));
    caps.expect_infer_topics()
        .returning(|_| Err(anyhow!("capability offline")));
    caps.expect_summarize()
        .returning(|_, _| Err(anyhow!("capability offline")));
    caps.expect_detect_address()
        .returning(|_, _| Err(anyhow!("capability offline")));
    caps.expect_verify_follow_up()
        .returning(|_, _, _| Err(anyhow!("capability offline")));
    caps.expect_decide()
        .returning(|_, _, _| Err(anyhow!("capability offline")));
    caps.expect_detect_factual_error()
        .returning(|_| Err(anyhow!("capability offline")));
    caps.expect_detect_stuck()
        .returning(|_, _| Err(anyhow!("capability offline")));
    caps.expect_judge_similarity()
        .returning(|_, _| Err(anyhow!("capability offline")));
    caps.expect_perspective()
        .returning(|_, _| Err(anyhow!("capability offline")));
    caps
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
