//! The gateway every LLM call goes through.
//!
//! Owns the only per-process mutable state on the request path: the
//! admission gate, the retry loop, and retry metrics. Providers are
//! registered once and selected per request; arguments a provider cannot
//! honour are forwarded and ignored there.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::llm::rate_limit::RateLimiter;
use crate::llm::{LlmCompletion, LlmProvider, LlmProviderType, LlmRequest};

/// Resilience parameters for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Minimum gap between any two outbound requests.
    pub min_request_gap: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Base for the 429 backoff when no Retry-After is present
    /// (`backoff_base * attempt`).
    pub backoff_base: Duration,
    /// Fixed delay between attempts after a 5xx.
    pub server_retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_request_gap: Duration::from_millis(500),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            server_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Counters for retry behaviour across the gateway's lifetime.
#[derive(Debug, Default)]
struct RetryMetrics {
    total_attempts: AtomicU64,
    first_attempt_successes: AtomicU64,
    first_attempt_failures: AtomicU64,
    successful_retries: AtomicU64,
    failed_retries: AtomicU64,
}

impl RetryMetrics {
    fn record(&self, attempt: u32, success: bool) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        let counter = match (attempt == 1, success) {
            (true, true) => &self.first_attempt_successes,
            (true, false) => &self.first_attempt_failures,
            (false, true) => &self.successful_retries,
            (false, false) => &self.failed_retries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of the gateway's retry counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryMetricsSummary {
    pub total_attempts: u64,
    pub first_attempt_successes: u64,
    pub first_attempt_failures: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
}

pub struct LlmGateway {
    config: GatewayConfig,
    limiter: RateLimiter,
    providers: HashMap<LlmProviderType, Arc<dyn LlmProvider>>,
    metrics: RetryMetrics,
}

impl LlmGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let limiter = RateLimiter::new(config.min_request_gap);
        Self {
            config,
            limiter,
            providers: HashMap::new(),
            metrics: RetryMetrics::default(),
        }
    }

    /// Register a provider adapter for a provider type. Replaces any
    /// previous registration for that type.
    pub fn register(&mut self, provider_type: LlmProviderType, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider_type, provider);
    }

    pub fn with_provider(
        mut self,
        provider_type: LlmProviderType,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        self.register(provider_type, provider);
        self
    }

    /// Send one prompt through the named provider and return the raw text.
    /// The gateway does not parse.
    pub async fn query(
        &self,
        provider_type: LlmProviderType,
        request: &LlmRequest,
    ) -> Result<String> {
        self.query_completion(provider_type, request)
            .await
            .map(|c| c.content)
    }

    /// As [`query`](Self::query), but returns the full completion record
    /// (hashes, token usage, latency).
    pub async fn query_completion(
        &self,
        provider_type: LlmProviderType,
        request: &LlmRequest,
    ) -> Result<LlmCompletion> {
        let provider = self
            .providers
            .get(&provider_type)
            .ok_or_else(|| {
                PipelineError::Config(format!("no provider registered for '{}'", provider_type))
            })?
            .clone();

        let max_attempts = self.config.max_attempts.max(1);
        let mut rate_limited_attempts = 0u32;
        let mut last_err: Option<PipelineError> = None;

        for attempt in 1..=max_attempts {
            self.limiter.acquire().await;
            match provider.complete(request).await {
                Ok(completion) => {
                    self.metrics.record(attempt, true);
                    tracing::debug!(
                        provider = %provider_type,
                        attempt,
                        latency_ms = completion.latency_ms as u64,
                        "llm request succeeded"
                    );
                    return Ok(completion);
                }
                Err(err) => {
                    self.metrics.record(attempt, false);
                    if !err.is_retryable() || attempt == max_attempts {
                        return Err(self.escalate(err, rate_limited_attempts, attempt));
                    }
                    let delay = match &err {
                        PipelineError::Server {
                            status: 429,
                            retry_after,
                        } => {
                            rate_limited_attempts += 1;
                            (*retry_after).unwrap_or(self.config.backoff_base * attempt)
                        }
                        PipelineError::Server { .. } => self.config.server_retry_delay,
                        _ => self.config.server_retry_delay,
                    };
                    tracing::warn!(
                        provider = %provider_type,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "llm request failed, retrying"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Loop always returns from the final attempt; this is unreachable in
        // practice but keeps the signature total.
        Err(last_err.unwrap_or(PipelineError::RateLimited {
            attempts: max_attempts,
        }))
    }

    /// Convert a terminal retryable error into its user-facing kind.
    fn escalate(
        &self,
        err: PipelineError,
        rate_limited_attempts: u32,
        attempt: u32,
    ) -> PipelineError {
        match err {
            PipelineError::Server { status: 429, .. } => PipelineError::RateLimited {
                attempts: rate_limited_attempts + 1,
            },
            PipelineError::Server { status, .. } => PipelineError::Transport(format!(
                "HTTP {} persisted through {} attempts",
                status, attempt
            )),
            other => other,
        }
    }

    pub fn retry_metrics(&self) -> RetryMetricsSummary {
        RetryMetricsSummary {
            total_attempts: self.metrics.total_attempts.load(Ordering::Relaxed),
            first_attempt_successes: self
                .metrics
                .first_attempt_successes
                .load(Ordering::Relaxed),
            first_attempt_failures: self.metrics.first_attempt_failures.load(Ordering::Relaxed),
            successful_retries: self.metrics.successful_retries.load(Ordering::Relaxed),
            failed_retries: self.metrics.failed_retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::stub::StubLlmProvider;
    use crate::llm::LlmProviderConfig;

    fn stub_gateway(stub: StubLlmProvider) -> LlmGateway {
        let mut config = GatewayConfig::default();
        config.min_request_gap = Duration::from_millis(1);
        config.backoff_base = Duration::from_millis(1);
        config.server_retry_delay = Duration::from_millis(1);
        LlmGateway::new(config).with_provider(LlmProviderType::Stub, Arc::new(stub))
    }

    #[tokio::test]
    async fn query_returns_provider_content() {
        let stub = StubLlmProvider::with_responses(
            LlmProviderConfig::new(LlmProviderType::Stub, "stub-model"),
            vec!["hello".to_string()],
        );
        let gateway = stub_gateway(stub);
        let out = gateway
            .query(LlmProviderType::Stub, &LlmRequest::new("ping"))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn unregistered_provider_is_a_config_error() {
        let gateway = LlmGateway::new(GatewayConfig::default());
        let err = gateway
            .query(LlmProviderType::OpenAI, &LlmRequest::new("ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn retries_rate_limits_then_escalates() {
        let stub = StubLlmProvider::with_failures(
            LlmProviderConfig::new(LlmProviderType::Stub, "stub-model"),
            // More 429s than the attempt budget.
            10,
        );
        let gateway = stub_gateway(stub);
        let err = gateway
            .query(LlmProviderType::Stub, &LlmRequest::new("ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RateLimited { attempts: 3 }));
        let metrics = gateway.retry_metrics();
        assert_eq!(metrics.total_attempts, 3);
        assert_eq!(metrics.first_attempt_failures, 1);
        assert_eq!(metrics.failed_retries, 2);
    }

    #[tokio::test]
    async fn recovers_after_transient_rate_limit() {
        let mut stub = StubLlmProvider::with_failures(
            LlmProviderConfig::new(LlmProviderType::Stub, "stub-model"),
            1,
        );
        stub.push_response("recovered".to_string());
        let gateway = stub_gateway(stub);
        let out = gateway
            .query(LlmProviderType::Stub, &LlmRequest::new("ping"))
            .await
            .unwrap();
        assert_eq!(out, "recovered");
        let metrics = gateway.retry_metrics();
        assert_eq!(metrics.successful_retries, 1);
    }
}
