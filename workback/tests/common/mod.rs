//! Shared helpers for integration tests: stub-backed gateways with fast
//! timings.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use workback::llm::{
    GatewayConfig, LlmGateway, LlmProviderConfig, LlmProviderType, StubLlmProvider,
};

pub fn fast_gateway_config() -> GatewayConfig {
    GatewayConfig {
        min_request_gap: Duration::from_millis(1),
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        server_retry_delay: Duration::from_millis(1),
    }
}

/// A gateway backed by a stub that replays `responses` in order, then falls
/// back to canned pattern-matched output.
pub fn scripted_gateway(responses: Vec<String>) -> LlmGateway {
    let stub = StubLlmProvider::with_responses(
        LlmProviderConfig::new(LlmProviderType::Stub, "stub-model"),
        responses,
    );
    LlmGateway::new(fast_gateway_config()).with_provider(LlmProviderType::Stub, Arc::new(stub))
}

/// A gateway backed by the stub's canned responses only.
pub fn canned_gateway() -> LlmGateway {
    scripted_gateway(Vec::new())
}

pub fn stub_model() -> workback::llm::ModelSpec {
    workback::llm::ModelSpec::new(LlmProviderType::Stub, "stub-model")
}
