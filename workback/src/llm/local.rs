//! Local model runtime provider (Ollama-shaped API).
//!
//! Pulls the model on first use when the runtime does not have it, then
//! issues non-streaming chat requests. Supports one optional image
//! attachment, sent base64-encoded the way the local API expects.

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::llm::{
    parse_retry_after, sha256_hex, status_error, transport_error, truncate, LlmCompletion,
    LlmProvider, LlmProviderConfig, LlmProviderInfo, LlmRequest,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct LocalChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct LocalChatRequest {
    model: String,
    messages: Vec<LocalChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<LocalOptions>,
}

#[derive(Debug, Serialize)]
struct LocalOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    message: LocalResponseMessage,
}

#[derive(Debug, Deserialize)]
struct LocalResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

pub struct LocalLlmProvider {
    config: LlmProviderConfig,
    client: reqwest::Client,
    // Names of models confirmed present, so the tags/pull round-trip runs
    // once per model per process.
    pulled: Mutex<Vec<String>>,
}

impl LocalLlmProvider {
    pub fn new(config: LlmProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout())
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            pulled: Mutex::new(Vec::new()),
        })
    }

    fn base_url<'a>(&'a self, request: &'a LlmRequest) -> &'a str {
        request
            .base_url
            .as_deref()
            .or(self.config.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    /// Pull the model if the runtime does not already have it.
    async fn ensure_model(&self, base_url: &str, model: &str) -> Result<()> {
        let mut pulled = self.pulled.lock().await;
        if pulled.iter().any(|m| m == model) {
            return Ok(());
        }

        let tags_url = format!("{}/api/tags", base_url.trim_end_matches('/'));
        let deadline = self.config.default_timeout();
        let present = match self.client.get(&tags_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let tags: TagsResponse = resp.json().await.unwrap_or(TagsResponse { models: vec![] });
                tags.models.iter().any(|t| t.name.starts_with(model))
            }
            Ok(_) | Err(_) => false,
        };

        if !present {
            tracing::info!(model, "pulling model into local runtime");
            let pull_url = format!("{}/api/pull", base_url.trim_end_matches('/'));
            let response = self
                .client
                .post(&pull_url)
                .json(&serde_json::json!({"name": model, "stream": false}))
                .send()
                .await
                .map_err(|e| transport_error(e, deadline))?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, None, &body));
            }
        }

        pulled.push(model.to_string());
        Ok(())
    }

    fn encode_image(path: &std::path::Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
impl LlmProvider for LocalLlmProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmCompletion> {
        let base_url = self.base_url(request).to_string();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        self.ensure_model(&base_url, &model).await?;

        let images = match &request.image_path {
            Some(path) => Some(vec![Self::encode_image(path)?]),
            None => None,
        };

        let body = LocalChatRequest {
            model,
            messages: vec![LocalChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
                images,
            }],
            stream: false,
            options: request
                .temperature
                .or(self.config.temperature)
                .map(|t| LocalOptions {
                    temperature: Some(t),
                }),
        };

        let deadline = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let prompt_hash = sha256_hex(request.prompt.as_bytes());
        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
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

        let parsed: LocalChatResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Transport(format!(
                "malformed local chat response: {} ({})",
                e,
                truncate(&raw, 500)
            ))
        })?;

        Ok(LlmCompletion {
            content: parsed.message.content,
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
            name: "local".to_string(),
            model: self.config.model.clone(),
            capabilities: vec!["chat".to_string(), "image".to_string()],
        }
    }
}
