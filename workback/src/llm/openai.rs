//! Hosted OpenAI-compatible chat-completion provider.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::llm::{
    parse_retry_after, sha256_hex, status_error, transport_error, truncate, LlmCompletion,
    LlmProvider, LlmProviderConfig, LlmProviderInfo, LlmRequest,
};

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

pub struct OpenAILlmProvider {
    config: LlmProviderConfig,
    client: reqwest::Client,
}

impl OpenAILlmProvider {
    pub fn new(config: LlmProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout())
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl LlmProvider for OpenAILlmProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmCompletion> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| PipelineError::AuthFailed("API key required for hosted provider".to_string()))?;

        let base_url = request
            .base_url
            .as_deref()
            .or(self.config.base_url.as_deref())
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let body = ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            temperature: request.temperature.or(self.config.temperature),
            top_p: None,
            max_completion_tokens: request.max_tokens.or(self.config.max_tokens),
            stream: false,
        };

        let deadline = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let prompt_hash = sha256_hex(request.prompt.as_bytes());

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, deadline))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, &body));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(e, deadline))?;
        let latency_ms = start.elapsed().as_millis();
        let response_hash = sha256_hex(raw.as_bytes());

        let parsed: ChatResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Transport(format!(
                "malformed chat-completion response: {} ({})",
                e,
                truncate(&raw, 500)
            ))
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                PipelineError::Transport("chat-completion response carried no content".to_string())
            })?;

        Ok(LlmCompletion {
            content,
            prompt_hash,
            response_hash,
            prompt_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
            total_tokens: parsed.usage.as_ref().and_then(|u| u.total_tokens),
            latency_ms,
        })
    }

    fn get_info(&self) -> LlmProviderInfo {
        LlmProviderInfo {
            name: "openai-compatible".to_string(),
            model: self.config.model.clone(),
            capabilities: vec!["chat".to_string()],
        }
    }
}
