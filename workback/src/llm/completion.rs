//! Completion-only hosted provider (`/completions`, no chat framing).

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::llm::{
    parse_retry_after, sha256_hex, status_error, transport_error, truncate, LlmCompletion,
    LlmProvider, LlmProviderConfig, LlmProviderInfo, LlmRequest,
};

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: Option<String>,
}

pub struct CompletionLlmProvider {
    config: LlmProviderConfig,
    client: reqwest::Client,
}

impl CompletionLlmProvider {
    pub fn new(config: LlmProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout())
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl LlmProvider for CompletionLlmProvider {
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
            .ok_or_else(|| {
                PipelineError::Config("completion provider requires a base_url".to_string())
            })?;
        let url = format!("{}/completions", base_url.trim_end_matches('/'));

        let body = CompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            prompt: request.prompt.clone(),
            temperature: request.temperature.or(self.config.temperature),
            max_tokens: request.max_tokens.or(self.config.max_tokens),
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

        let parsed: CompletionResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Transport(format!(
                "malformed completion response: {} ({})",
                e,
                truncate(&raw, 500)
            ))
        })?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| {
                PipelineError::Transport("completion response carried no text".to_string())
            })?;

        Ok(LlmCompletion {
            content,
            prompt_hash,
            response_hash,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            latency_ms,
        })
    }

    fn get_info(&self) -> LlmProviderInfo {
        LlmProviderInfo {
            name: "completion".to_string(),
            model: self.config.model.clone(),
            capabilities: vec!["completion".to_string()],
        }
    }
}
