//! Error types for the workback pipeline.
//!
//! One variant per failure kind the pipeline distinguishes. Components that
//! recover internally (the gateway, the pair builder, the orchestrator) do so
//! by matching on these variants rather than inspecting strings.

use std::time::Duration;

/// Unified error type for all pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Rate limit still in effect after the retry budget was spent.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// A single attempt exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication failed and could not be refreshed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Transport-level failure (connect, TLS, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream returned a retryable HTTP error. Internal to the gateway's
    /// retry loop; escalated as `Transport` when the budget is exhausted.
    #[error("server error (HTTP {status})")]
    Server {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// No structured value could be recovered from model output.
    #[error("unparseable model output: {0}")]
    Unparseable(String),

    /// A structured value was recovered but does not match the expected shape.
    #[error("schema error: {0}")]
    SchemaError(String),

    /// The judge produced nothing usable for a plan.
    #[error("judge unavailable: {0}")]
    JudgeUnavailable(String),

    /// A preference pair was rejected by an acceptance gate. Not a failure:
    /// the orchestrator counts gated units separately.
    #[error("gating rejected: {0}")]
    GatingRejected(String),

    /// A persona file could not be loaded or is structurally invalid.
    #[error("invalid persona {path}: {reason}")]
    PersonaInvalid { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the gateway may retry the failed attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited { .. } | PipelineError::Server { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
