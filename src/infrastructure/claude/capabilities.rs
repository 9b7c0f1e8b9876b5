//! Typed capability adapter over the model client.
//!
//! Maps each capability in the `Capabilities` port to a prompt template, a
//! model tier, and a token budget, then parses the structured reply. Parsing
//! is lenient about surrounding prose and code fences, but a reply that does
//! not contain the expected JSON is an `Err` — the conservative default is
//! applied by the caller, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::{
    Decision, DecisionPath, FactualError, ModelConfig, ModeratorConfig, Severity, StuckSignal,
    TaskKind, TopicState, TriggerSignal,
};
use crate::domain::ports::{Capabilities, PerspectiveRequest};

use super::client::ModelClient;
use super::prompts;
use super::types::MessageRequest;

/// Temperatures per call class.
const CLASSIFY_TEMPERATURE: f32 = 0.2;
const SUMMARY_TEMPERATURE: f32 = 0.3;
const PERSPECTIVE_TEMPERATURE: f32 = 0.7;

pub struct ModelCapabilities {
    client: Arc<ModelClient>,
    model: ModelConfig,
    moderator: ModeratorConfig,
}

impl ModelCapabilities {
    pub fn new(client: Arc<ModelClient>, model: ModelConfig, moderator: ModeratorConfig) -> Self {
        Self {
            client,
            model,
            moderator,
        }
    }

    /// Fast-tier structured call returning parsed JSON.
    async fn classify<T: DeserializeOwned>(&self, prompt: String, max_tokens: u32) -> Result<T> {
        let request = MessageRequest::user(&self.model.fast_model, prompt, max_tokens)
            .with_temperature(CLASSIFY_TEMPERATURE);
        let text = self.client.complete(request).await?;
        parse_json_reply(&text)
    }

    /// Standard-tier structured call returning parsed JSON.
    async fn judge<T: DeserializeOwned>(&self, prompt: String, max_tokens: u32) -> Result<T> {
        let request = MessageRequest::user(&self.model.model, prompt, max_tokens)
            .with_temperature(SUMMARY_TEMPERATURE);
        let text = self.client.complete(request).await?;
        parse_json_reply(&text)
    }
}

#[async_trait]
impl Capabilities for ModelCapabilities {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>> {
        let wire: KeywordsWire = self
            .classify(prompts::keyword_extraction(text), 150)
            .await?;
        Ok(wire.keywords)
    }

    async fn infer_topics(&self, transcript: &str) -> Result<TopicState> {
        let wire: TopicsWire = self
            .classify(prompts::topic_inference(transcript), 400)
            .await?;
        Ok(TopicState {
            domains: wire.active_domains,
            confidence: wire.confidence_scores,
            keywords: wire.topic_keywords,
        })
    }

    async fn summarize(&self, previous: &str, new_messages: &str) -> Result<String> {
        let request = MessageRequest::user(
            &self.model.model,
            prompts::summarization(previous, new_messages),
            1000,
        )
        .with_temperature(SUMMARY_TEMPERATURE);
        let text = self.client.complete(request).await?;
        Ok(text.trim().to_string())
    }

    async fn detect_address(&self, speaker: &str, text: &str) -> Result<bool> {
        let prompt = prompts::address_detection(&self.moderator.assistant_name, speaker, text);
        let wire: AddressWire = self.classify(prompt, 50).await?;
        Ok(wire.is_addressing)
    }

    async fn verify_follow_up(&self, speaker: &str, text: &str, last_reply: &str) -> Result<bool> {
        let prompt = prompts::follow_up_verification(last_reply, speaker, text);
        let wire: FollowUpWire = self.classify(prompt, 100).await?;
        Ok(wire.is_follow_up)
    }

    async fn decide(
        &self,
        signal: &TriggerSignal,
        context: &str,
        active_domains: &[String],
    ) -> Result<Decision> {
        let trigger = serde_json::to_string_pretty(signal)?;
        let domains = if active_domains.is_empty() {
            "none identified yet".to_string()
        } else {
            active_domains.join(", ")
        };
        let prompt =
            prompts::decision(&self.moderator.assistant_name, &trigger, context, &domains);
        let wire: DecisionWire = self.judge(prompt, 500).await?;
        Ok(Decision {
            path: wire.decision_path,
            reasoning: wire.reasoning,
            active_domains: wire.active_domains,
            missing_domains: wire.missing_domains,
            urgency: wire.urgency.clamp(0.0, 10.0) as u8,
            task: wire.task_type,
        })
    }

    async fn detect_factual_error(&self, transcript: &str) -> Result<Option<FactualError>> {
        let wire: FactualErrorWire = self
            .judge(prompts::factual_error_detection(transcript), 400)
            .await?;
        if !wire.error_detected {
            return Ok(None);
        }
        Ok(Some(FactualError {
            description: wire.error_description,
            correction: wire.correct_information,
            severity: wire.severity,
            domains: wire.domains_needed,
            issue: wire.issue_description,
        }))
    }

    async fn detect_stuck(&self, transcript: &str, history: &str) -> Result<Option<StuckSignal>> {
        let wire: StuckWire = self
            .judge(prompts::stuck_detection(transcript, history), 400)
            .await?;
        if !wire.stuck_detected {
            return Ok(None);
        }
        Ok(Some(StuckSignal {
            kind: wire.stuck_type.unwrap_or_default(),
            description: wire.description,
            severity: wire.severity,
            domains: wire.domains_needed,
            issue: wire.issue_description,
        }))
    }

    async fn judge_similarity(&self, first: &str, second: &str) -> Result<bool> {
        let wire: SimilarityWire = self
            .classify(prompts::semantic_similarity(first, second), 100)
            .await?;
        Ok(wire.are_similar)
    }

    async fn perspective(&self, domain: &str, request: &PerspectiveRequest) -> Result<String> {
        let active_domains = if request.active_domains.is_empty() {
            "general discussion".to_string()
        } else {
            request.active_domains.join(", ")
        };
        let prompt = prompts::perspective(
            domain,
            &request.context,
            &active_domains,
            &request.history,
            request.task,
        );
        let message = MessageRequest::user(&self.model.model, prompt, 300)
            .with_temperature(PERSPECTIVE_TEMPERATURE);
        let text = self.client.complete(message).await?;
        Ok(text.trim().to_string())
    }
}

/// Extracts the outermost JSON object from a reply that may carry prose or
/// code fences around it, then deserializes it.
fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let start = text.find('{').context("no JSON object in model reply")?;
    let end = text.rfind('}').context("unterminated JSON object in model reply")?;
    let body = &text[start..=end];
    serde_json::from_str(body).with_context(|| format!("malformed model reply: {body}"))
}

#[derive(Deserialize)]
struct KeywordsWire {
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
struct TopicsWire {
    #[serde(default)]
    active_domains: Vec<String>,
    #[serde(default)]
    confidence_scores: HashMap<String, f64>,
    #[serde(default)]
    topic_keywords: Vec<String>,
}

#[derive(Deserialize)]
struct AddressWire {
    is_addressing: bool,
}

#[derive(Deserialize)]
struct FollowUpWire {
    is_follow_up: bool,
}

#[derive(Deserialize)]
struct SimilarityWire {
    are_similar: bool,
}

#[derive(Deserialize)]
struct DecisionWire {
    decision_path: DecisionPath,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    active_domains: Vec<String>,
    #[serde(default)]
    missing_domains: Vec<String>,
    #[serde(default)]
    urgency: f64,
    #[serde(default)]
    task_type: TaskKind,
}

#[derive(Deserialize)]
struct FactualErrorWire {
    error_detected: bool,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    correct_information: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    domains_needed: Vec<String>,
    #[serde(default)]
    issue_description: String,
}

#[derive(Deserialize)]
struct StuckWire {
    stuck_detected: bool,
    #[serde(default)]
    stuck_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    domains_needed: Vec<String>,
    #[serde(default)]
    issue_description: String,
}
