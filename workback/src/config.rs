//! Configuration: optional TOML file merged with environment variables.
//!
//! Precedence is file < environment. API keys come from the environment
//! only (`OPENAI_API_KEY`, `WORKBACK_API_KEY`), never from the file, so
//! config files stay committable.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::dataset::PipelineModels;
use crate::error::{PipelineError, Result};
use crate::llm::{
    GatewayConfig, LlmGateway, LlmProviderConfig, LlmProviderFactory, LlmProviderType, ModelSpec,
};
use crate::persona::LabelingConfig;

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    provider: Option<LlmProviderType>,
    base_url: Option<String>,
    #[serde(default)]
    gateway: GatewayFileConfig,
    #[serde(default)]
    models: ModelsFileConfig,
    #[serde(default)]
    labeling: LabelingFileConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct GatewayFileConfig {
    min_request_gap_ms: Option<u64>,
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    server_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ModelsFileConfig {
    analysis: Option<String>,
    structure: Option<String>,
    judge: Option<String>,
    calendar: Option<String>,
    analysis_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct LabelingFileConfig {
    internal_domains: Option<Vec<String>>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: LlmProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub gateway: GatewayConfig,
    pub models: PipelineModels,
    pub labeling: LabelingConfig,
}

impl Config {
    /// Load configuration, merging an optional TOML file with environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let file: FileConfig = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    PipelineError::Config(format!("cannot read config {}: {}", p.display(), e))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    PipelineError::Config(format!("malformed config {}: {}", p.display(), e))
                })?
            }
            None => FileConfig::default(),
        };

        let api_key = std::env::var("WORKBACK_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();

        let provider = match std::env::var("WORKBACK_PROVIDER") {
            Ok(name) => parse_provider(&name)?,
            Err(_) => file.provider.unwrap_or({
                if api_key.is_some() {
                    LlmProviderType::OpenAI
                } else {
                    LlmProviderType::Local
                }
            }),
        };

        let base_url = std::env::var("WORKBACK_BASE_URL").ok().or(file.base_url);

        let gateway = GatewayConfig {
            min_request_gap: Duration::from_millis(file.gateway.min_request_gap_ms.unwrap_or(500)),
            max_attempts: file.gateway.max_attempts.unwrap_or(3),
            backoff_base: Duration::from_millis(file.gateway.backoff_base_ms.unwrap_or(500)),
            server_retry_delay: Duration::from_millis(
                file.gateway.server_retry_delay_ms.unwrap_or(2000),
            ),
        };

        let model_name = |env: &str, from_file: &Option<String>, fallback: &str| -> String {
            std::env::var(env)
                .ok()
                .or_else(|| from_file.clone())
                .unwrap_or_else(|| fallback.to_string())
        };

        let analysis_model = model_name("WORKBACK_ANALYSIS_MODEL", &file.models.analysis, "gpt-4o");
        let structure_model =
            model_name("WORKBACK_STRUCTURE_MODEL", &file.models.structure, "gpt-4o-mini");
        let judge_model = model_name("WORKBACK_JUDGE_MODEL", &file.models.judge, "gpt-4o-mini");
        let calendar_model =
            model_name("WORKBACK_CALENDAR_MODEL", &file.models.calendar, "gpt-4o-mini");
        let analysis_timeout =
            Duration::from_secs(file.models.analysis_timeout_seconds.unwrap_or(300));

        let spec = |model: String, temperature: f64, timeout: Duration| {
            let mut s = ModelSpec::new(provider, model)
                .with_temperature(temperature)
                .with_timeout(timeout);
            s.base_url = base_url.clone();
            s
        };

        let models = PipelineModels {
            analysis: spec(analysis_model, 1.0, analysis_timeout),
            structure: spec(structure_model, 0.2, Duration::from_secs(120)),
            judge: spec(judge_model, 0.1, Duration::from_secs(120)),
            calendar: spec(calendar_model, 0.9, Duration::from_secs(180)),
        };

        let labeling = LabelingConfig {
            internal_domains: std::env::var("WORKBACK_INTERNAL_DOMAINS")
                .ok()
                .map(|raw| raw.split(',').map(|d| d.trim().to_string()).collect())
                .or(file.labeling.internal_domains)
                .unwrap_or_else(|| LabelingConfig::default().internal_domains),
        };

        Ok(Config {
            provider,
            api_key,
            base_url,
            gateway,
            models,
            labeling,
        })
    }

    /// Construct a gateway with the configured provider registered.
    pub fn build_gateway(&self) -> Result<LlmGateway> {
        let mut provider_config =
            LlmProviderConfig::new(self.provider, self.models.structure.model.clone());
        provider_config.api_key = self.api_key.clone();
        provider_config.base_url = self.base_url.clone();
        let provider = LlmProviderFactory::create_provider(provider_config)?;
        Ok(LlmGateway::new(self.gateway.clone())
            .with_provider(self.provider, std::sync::Arc::from(provider)))
    }
}

fn parse_provider(name: &str) -> Result<LlmProviderType> {
    match name.to_lowercase().as_str() {
        "stub" => Ok(LlmProviderType::Stub),
        "openai" => Ok(LlmProviderType::OpenAI),
        "local" => Ok(LlmProviderType::Local),
        "enterprise" => Ok(LlmProviderType::Enterprise),
        "completion" => Ok(LlmProviderType::Completion),
        other => Err(PipelineError::Config(format!(
            "unknown provider '{}'; expected stub|openai|local|enterprise|completion",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_a_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.gateway.min_request_gap, Duration::from_millis(500));
        assert!((config.models.analysis.temperature - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workback.toml");
        std::fs::write(
            &path,
            r#"
provider = "local"
base_url = "http://localhost:11434"

[gateway]
max_attempts = 5

[models]
structure = "llama3.1:8b"

[labeling]
internal_domains = ["example.org"]
"#,
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.gateway.max_attempts, 5);
        assert_eq!(config.models.structure.model, "llama3.1:8b");
        assert_eq!(config.labeling.internal_domains, vec!["example.org"]);
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        assert!(parse_provider("mainframe").is_err());
    }
}
