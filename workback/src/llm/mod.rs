//! LLM provider abstraction and the gateway all model traffic flows through.
//!
//! Providers adapt one backend each (hosted chat-completion, local runtime,
//! broker-authenticated enterprise endpoint, completion-only endpoint, and a
//! deterministic stub for tests) behind a common trait. The gateway owns the
//! per-process state: rate limiting, retry, and retry metrics.

pub mod completion;
pub mod enterprise;
pub mod gateway;
pub mod local;
pub mod openai;
pub mod rate_limit;
pub mod stub;

pub use gateway::{GatewayConfig, LlmGateway, RetryMetricsSummary};
pub use rate_limit::RateLimiter;
pub use stub::StubLlmProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};

/// Supported LLM provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    /// Deterministic responses for testing.
    Stub,
    /// Hosted OpenAI-compatible chat-completion endpoint.
    OpenAI,
    /// Local model runtime (Ollama-style), pull-if-missing.
    Local,
    /// Broker-authenticated enterprise endpoint.
    Enterprise,
    /// Completion-only hosted endpoint.
    Completion,
}

impl std::fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LlmProviderType::Stub => "stub",
            LlmProviderType::OpenAI => "openai",
            LlmProviderType::Local => "local",
            LlmProviderType::Enterprise => "enterprise",
            LlmProviderType::Completion => "completion",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for constructing a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub provider_type: LlmProviderType,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub timeout_seconds: Option<u64>,
}

impl LlmProviderConfig {
    pub fn new(provider_type: LlmProviderType, model: impl Into<String>) -> Self {
        Self {
            provider_type,
            model: model.into(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            timeout_seconds: None,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(120))
    }
}

/// One request through the gateway. Fields a provider cannot honour are
/// ignored by that provider.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub prompt: String,
    /// Overrides the provider's configured model when set.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Per-attempt deadline; provider default applies when unset.
    pub timeout: Option<Duration>,
    /// Path to an image to attach (local provider only).
    pub image_path: Option<std::path::PathBuf>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A stage's model configuration: which provider and model to call and how.
/// Every pipeline stage takes one of these as a call-site override so a
/// single model can serve all stages in low-budget environments.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: LlmProviderType,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ModelSpec {
    pub fn new(provider: LlmProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the request this spec implies for a prompt.
    pub fn request(&self, prompt: impl Into<String>) -> LlmRequest {
        LlmRequest {
            prompt: prompt.into(),
            model: Some(self.model.clone()),
            base_url: self.base_url.clone(),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            timeout: Some(self.timeout),
            image_path: None,
        }
    }
}

/// Summary of a single completed LLM call.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: String,
    pub prompt_hash: String,
    pub response_hash: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub latency_ms: u128,
}

/// Information about a provider adapter.
#[derive(Debug, Clone)]
pub struct LlmProviderInfo {
    pub name: String,
    pub model: String,
    pub capabilities: Vec<String>,
}

/// Abstract interface for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion attempt. No retry at this layer; the gateway owns
    /// the retry loop.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmCompletion>;

    fn get_info(&self) -> LlmProviderInfo;
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Classify an HTTP error status into the pipeline error taxonomy.
pub(crate) fn status_error(status: u16, retry_after: Option<Duration>, body: &str) -> PipelineError {
    match status {
        401 | 403 => PipelineError::AuthFailed(format!("HTTP {}: {}", status, truncate(body, 200))),
        429 => PipelineError::Server {
            status,
            retry_after,
        },
        s if s >= 500 => PipelineError::Server {
            status,
            retry_after: None,
        },
        _ => PipelineError::Transport(format!("HTTP {}: {}", status, truncate(body, 500))),
    }
}

/// Parse a `Retry-After` header (seconds form only).
pub(crate) fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a reqwest send/read error to the pipeline taxonomy.
pub(crate) fn transport_error(err: reqwest::Error, deadline: Duration) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout(deadline)
    } else {
        PipelineError::Transport(err.to_string())
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}... [truncated, {} bytes total]", cut, s.len())
    }
}

/// Factory for creating LLM providers.
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create a provider adapter from configuration.
    pub fn create_provider(config: LlmProviderConfig) -> Result<Box<dyn LlmProvider>> {
        match config.provider_type {
            LlmProviderType::Stub => {
                let allow_stub = std::env::var("WORKBACK_ALLOW_STUB_PROVIDER")
                    .map(|v| v == "1" || v == "true")
                    .unwrap_or(false)
                    || cfg!(test);
                if !allow_stub {
                    return Err(PipelineError::Config(
                        "stub provider is not allowed outside tests; set \
                         WORKBACK_ALLOW_STUB_PROVIDER=1 to enable, or configure a real provider"
                            .to_string(),
                    ));
                }
                tracing::warn!("using stub LLM provider; output is canned");
                Ok(Box::new(stub::StubLlmProvider::new(config)))
            }
            LlmProviderType::OpenAI => Ok(Box::new(openai::OpenAILlmProvider::new(config)?)),
            LlmProviderType::Local => Ok(Box::new(local::LocalLlmProvider::new(config)?)),
            LlmProviderType::Enterprise => Ok(Box::new(enterprise::EnterpriseLlmProvider::new(
                config,
                enterprise::BrokerSettings::from_env(),
            )?)),
            LlmProviderType::Completion => {
                Ok(Box::new(completion::CompletionLlmProvider::new(config)?))
            }
        }
    }
}
