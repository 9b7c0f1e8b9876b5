use anyhow::{Context, Result};
use reqwest::Client as ReqwestClient;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::ModelConfig;

use super::error::ModelApiError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use super::types::{MessageRequest, MessageResponse};

/// HTTP client for the Anthropic Messages API.
///
/// Connection pooling via reqwest, token-bucket rate limiting, exponential
/// backoff on transient errors, and a hard request timeout. Every capability
/// call in the system funnels through `complete`.
pub struct ModelClient {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    /// Build a client from configuration. The API key comes from the config
    /// or the `ANTHROPIC_API_KEY` environment variable.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .context("no API key configured and ANTHROPIC_API_KEY is unset")?;

        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: TokenBucketRateLimiter::new(config.requests_per_second),
            retry_policy: RetryPolicy::new(
                config.retry.max_retries,
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ),
        })
    }

    /// Send a request and return the response text. Transient failures are
    /// retried under the configured policy.
    pub async fn complete(&self, request: MessageRequest) -> Result<String, ModelApiError> {
        self.rate_limiter.acquire().await;

        let response = self
            .retry_policy
            .execute(|| self.send_request(&request))
            .await?;

        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model call completed"
        );

        let text = response.text();
        if text.trim().is_empty() {
            return Err(ModelApiError::EmptyResponse);
        }
        Ok(text)
    }

    async fn send_request(&self, request: &MessageRequest) -> Result<MessageResponse, ModelApiError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModelApiError::Timeout
                } else {
                    ModelApiError::NetworkError(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(ModelApiError::from_status(status, body));
        }

        let message: MessageResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                ModelApiError::Timeout
            } else {
                ModelApiError::Unknown(format!("failed to parse response: {err}"))
            }
        })?;
        Ok(message)
    }
}
