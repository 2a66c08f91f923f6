//! Broker-authenticated enterprise provider.
//!
//! Chat-completion endpoint behind corporate OAuth. One bearer token is
//! cached per process; acquisition tries silent sources first (environment,
//! token file) and falls back to the device-code flow when configured. The
//! token is bound to a fixed scope; scope and tenant come from
//! configuration, never from the request.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::llm::openai::ChatMessage;
use crate::llm::{
    parse_retry_after, sha256_hex, status_error, transport_error, truncate, LlmCompletion,
    LlmProvider, LlmProviderConfig, LlmProviderInfo, LlmRequest,
};

/// Broker configuration: where and how to acquire tokens, and the extra
/// headers the enterprise endpoint requires.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// OAuth scope the token is bound to.
    pub scope: String,
    pub tenant: Option<String>,
    pub client_id: Option<String>,
    /// Device-code authorization endpoint; interactive acquisition is
    /// disabled when unset.
    pub device_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    /// Token file written by a previous interactive acquisition.
    pub token_file: Option<PathBuf>,
    /// Sent as `X-ModelType`.
    pub model_type: String,
    /// Sent as `X-ScenarioGUID`.
    pub scenario_guid: String,
}

impl BrokerSettings {
    pub fn from_env() -> Self {
        Self {
            scope: std::env::var("WORKBACK_BROKER_SCOPE")
                .unwrap_or_else(|_| "api://workback/.default".to_string()),
            tenant: std::env::var("WORKBACK_BROKER_TENANT").ok(),
            client_id: std::env::var("WORKBACK_BROKER_CLIENT_ID").ok(),
            device_endpoint: std::env::var("WORKBACK_BROKER_DEVICE_ENDPOINT").ok(),
            token_endpoint: std::env::var("WORKBACK_BROKER_TOKEN_ENDPOINT").ok(),
            token_file: std::env::var("WORKBACK_BROKER_TOKEN_FILE").ok().map(PathBuf::from),
            model_type: std::env::var("WORKBACK_MODEL_TYPE").unwrap_or_else(|_| "chat".to_string()),
            scenario_guid: std::env::var("WORKBACK_SCENARIO_GUID").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct BrokerToken {
    access_token: String,
    acquired_at: Instant,
    expires_in: Duration,
}

impl BrokerToken {
    fn is_fresh(&self) -> bool {
        // Refresh slightly early so a token never expires mid-request.
        self.acquired_at.elapsed() + Duration::from_secs(60) < self.expires_in
    }
}

#[derive(Debug, Deserialize)]
struct TokenFilePayload {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

pub struct EnterpriseLlmProvider {
    config: LlmProviderConfig,
    broker: BrokerSettings,
    client: reqwest::Client,
    token_cache: Mutex<Option<BrokerToken>>,
}

impl EnterpriseLlmProvider {
    pub fn new(config: LlmProviderConfig, broker: BrokerSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout())
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            broker,
            client,
            token_cache: Mutex::new(None),
        })
    }

    /// Acquire a token: cache, then silent sources, then interactive.
    async fn acquire_token(&self, force_refresh: bool) -> Result<String> {
        let mut cache = self.token_cache.lock().await;
        if !force_refresh {
            if let Some(token) = cache.as_ref() {
                if token.is_fresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        if let Some(token) = self.acquire_silent() {
            let access = token.access_token.clone();
            *cache = Some(token);
            return Ok(access);
        }

        let token = self.acquire_interactive().await?;
        let access = token.access_token.clone();
        *cache = Some(token);
        Ok(access)
    }

    fn acquire_silent(&self) -> Option<BrokerToken> {
        if let Ok(raw) = std::env::var("WORKBACK_ENTERPRISE_TOKEN") {
            if !raw.is_empty() {
                return Some(BrokerToken {
                    access_token: raw,
                    acquired_at: Instant::now(),
                    expires_in: Duration::from_secs(3600),
                });
            }
        }
        let path = self.broker.token_file.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        let payload: TokenFilePayload = serde_json::from_str(&raw).ok()?;
        Some(BrokerToken {
            access_token: payload.access_token,
            acquired_at: Instant::now(),
            expires_in: Duration::from_secs(payload.expires_in.unwrap_or(3600)),
        })
    }

    /// Device-code flow: print the user code, poll the token endpoint.
    async fn acquire_interactive(&self) -> Result<BrokerToken> {
        let (device_endpoint, token_endpoint, client_id) = match (
            &self.broker.device_endpoint,
            &self.broker.token_endpoint,
            &self.broker.client_id,
        ) {
            (Some(d), Some(t), Some(c)) => (d, t, c),
            _ => {
                return Err(PipelineError::AuthFailed(
                    "no cached token and interactive broker flow is not configured".to_string(),
                ))
            }
        };

        let deadline = self.config.default_timeout();
        let response = self
            .client
            .post(device_endpoint)
            .form(&[
                ("client_id", client_id.as_str()),
                ("scope", self.broker.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(e, deadline))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::AuthFailed(format!(
                "device authorization failed (HTTP {}): {}",
                status,
                truncate(&body, 200)
            )));
        }
        let device: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::AuthFailed(format!("malformed device response: {}", e)))?;

        eprintln!(
            "To sign in, open {} and enter the code {}",
            device.verification_uri, device.user_code
        );

        let interval = Duration::from_secs(device.interval.unwrap_or(5));
        let budget = Duration::from_secs(device.expires_in.unwrap_or(300));
        let started = Instant::now();
        while started.elapsed() < budget {
            tokio::time::sleep(interval).await;
            let response = self
                .client
                .post(token_endpoint)
                .form(&[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                    ("client_id", client_id.as_str()),
                    ("device_code", device.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| transport_error(e, deadline))?;
            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| PipelineError::AuthFailed(format!("malformed token response: {}", e)))?;
            if let Some(access_token) = token.access_token {
                return Ok(BrokerToken {
                    access_token,
                    acquired_at: Instant::now(),
                    expires_in: Duration::from_secs(token.expires_in.unwrap_or(3600)),
                });
            }
            match token.error.as_deref() {
                Some("authorization_pending") | Some("slow_down") => continue,
                Some(other) => {
                    return Err(PipelineError::AuthFailed(format!(
                        "device flow failed: {}",
                        other
                    )))
                }
                None => continue,
            }
        }
        Err(PipelineError::AuthFailed(
            "device flow timed out waiting for sign-in".to_string(),
        ))
    }

    async fn send_chat(
        &self,
        request: &LlmRequest,
        bearer: &str,
    ) -> Result<(reqwest::StatusCode, String, Option<Duration>)> {
        let base_url = request
            .base_url
            .as_deref()
            .or(self.config.base_url.as_deref())
            .ok_or_else(|| {
                PipelineError::Config("enterprise provider requires a base_url".to_string())
            })?;
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        }];
        let body = serde_json::json!({
            "model": request.model.clone().unwrap_or_else(|| self.config.model.clone()),
            "messages": messages,
            "temperature": request.temperature.or(self.config.temperature),
            "max_completion_tokens": request.max_tokens.or(self.config.max_tokens),
            "stream": false,
        });

        let deadline = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .header("X-ModelType", &self.broker.model_type)
            .header("X-ScenarioGUID", &self.broker.scenario_guid)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, deadline))?;

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(e, deadline))?;
        Ok((status, raw, retry_after))
    }
}

#[async_trait]
impl LlmProvider for EnterpriseLlmProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmCompletion> {
        let prompt_hash = sha256_hex(request.prompt.as_bytes());
        let start = Instant::now();

        let mut bearer = self.acquire_token(false).await?;
        let (mut status, mut raw, mut retry_after) = self.send_chat(request, &bearer).await?;

        // One refresh on 401: the cached token may have been revoked.
        if status.as_u16() == 401 {
            tracing::info!("enterprise token rejected, refreshing once");
            bearer = self.acquire_token(true).await?;
            let retried = self.send_chat(request, &bearer).await?;
            status = retried.0;
            raw = retried.1;
            retry_after = retried.2;
        }

        if !status.is_success() {
            return Err(status_error(status.as_u16(), retry_after, &raw));
        }

        let latency_ms = start.elapsed().as_millis();
        let response_hash = sha256_hex(raw.as_bytes());
        let parsed: crate::llm::openai::ChatResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Transport(format!(
                "malformed enterprise response: {} ({})",
                e,
                truncate(&raw, 500)
            ))
        })?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                PipelineError::Transport("enterprise response carried no content".to_string())
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
            name: "enterprise".to_string(),
            model: self.config.model.clone(),
            capabilities: vec!["chat".to_string(), "broker-auth".to_string()],
        }
    }
}
