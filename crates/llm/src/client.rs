//! HTTP client for an OpenAI-compatible chat-completions endpoint.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use repo_summary_core::{call_with_retry, ApiError, ApiResult, CircuitBreaker, RetryPolicy};

use crate::parse;
use crate::prompts;
use crate::provider::{ModelApi, SummaryFragment};
use crate::types::{Decision, FinalResult, Message};

const DECISION_MAX_TOKENS: u32 = 16;

#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Chat-completions client. Every call goes through the shared retry policy
/// and the model circuit breaker.
pub struct HttpModelClient {
    config: ModelClientConfig,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl HttpModelClient {
    pub fn new(
        config: ModelClientConfig,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> ApiResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ApiError::invalid_input("model api key is not configured"));
        }
        if config.model.trim().is_empty() {
            return Err(ApiError::invalid_input("model name is not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            config,
            client,
            breaker,
            retry,
        })
    }

    async fn invoke(
        &self,
        messages: &[Message],
        json_mode: bool,
        max_tokens: u32,
    ) -> ApiResult<String> {
        call_with_retry(&self.retry, &self.breaker, || {
            self.post_chat(messages, json_mode, max_tokens)
        })
        .await
    }

    async fn post_chat(
        &self,
        messages: &[Message],
        json_mode: bool,
        max_tokens: u32,
    ) -> ApiResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            temperature: self.config.temperature,
            response_format: json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(format!("model response was not JSON: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::invalid_response("model response contained no choices"))?;
        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!(model = %self.config.model, "model output truncated at max_tokens");
        }
        let message = choice
            .message
            .ok_or_else(|| ApiError::invalid_response("model choice carried no message"))?;
        Ok(message.content.unwrap_or_default())
    }
}

fn map_request_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(format!("model request timed out: {err}"))
    } else {
        ApiError::network(format!("model request failed: {err}"))
    }
}

fn map_status_error(status: u16, body: &str) -> ApiError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        401 => ApiError::access_denied("model authentication failed"),
        429 => ApiError::rate_limited(format!("model rate limit exceeded: {snippet}")),
        500..=599 => ApiError::server_error(status, snippet),
        _ => ApiError::invalid_input(format!("model API error {status}: {snippet}")),
    }
}

#[async_trait]
impl ModelApi for HttpModelClient {
    async fn plan_batches(
        &self,
        structure_outline: &str,
        paths: &[String],
        max_batches: usize,
    ) -> ApiResult<Vec<Vec<String>>> {
        let messages = prompts::plan_messages(structure_outline, paths, max_batches);
        let content = self
            .invoke(&messages, true, self.config.max_tokens)
            .await?;
        let allowed: HashSet<String> = paths.iter().cloned().collect();
        Ok(parse::parse_plan_batches(&content, &allowed, max_batches))
    }

    async fn summarize_batch(&self, batch_label: &str, context: &str) -> ApiResult<String> {
        let messages = prompts::summarize_messages(batch_label, context);
        let content = self
            .invoke(&messages, true, self.config.max_tokens)
            .await?;
        Ok(parse::parse_batch_summary(&content))
    }

    async fn decide(&self, previous: &[String], latest: &str) -> ApiResult<Decision> {
        let messages = prompts::decide_messages(previous, latest);
        let content = self.invoke(&messages, false, DECISION_MAX_TOKENS).await?;
        Ok(parse::parse_decision(&content))
    }

    async fn synthesize(&self, fragments: &[SummaryFragment]) -> ApiResult<FinalResult> {
        let messages = prompts::synthesize_messages(fragments);
        let content = self
            .invoke(&messages, true, self.config.max_tokens)
            .await?;
        Ok(parse::parse_structured_summary(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(401, ""),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            map_status_error(429, "slow down"),
            ApiError::RateLimited(_)
        ));
        assert!(matches!(
            map_status_error(503, "overloaded"),
            ApiError::ServerError { status: 503, .. }
        ));
        assert!(matches!(
            map_status_error(400, "bad request"),
            ApiError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_rejects_missing_api_key() {
        let breaker = Arc::new(CircuitBreaker::new(
            "model",
            5,
            Duration::from_secs(60),
        ));
        let result = HttpModelClient::new(
            ModelClientConfig::default(),
            breaker,
            RetryPolicy::default(),
        );
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }
}
