//! Two-stage plan generation: a reasoning model decomposes the brief, a
//! cheaper structured model emits the schema.
//!
//! The structuring stage does not retry on schema failures; the caller
//! decides. Plans that parse but violate referential or ordering invariants
//! are returned as-is so the judge can penalize them.

use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};
use crate::extract::extract_value;
use crate::llm::{LlmCompletion, LlmGateway, ModelSpec};
use crate::plan::Plan;
use crate::prompts;

/// The outcome of one `generate_plan` call.
#[derive(Debug, Clone)]
pub struct PlanGeneration {
    /// Raw markdown from the reasoning stage. Later stages treat it as a blob.
    pub analysis: String,
    /// Present when structuring was requested and succeeded.
    pub structured: Option<Plan>,
    /// Provenance of the analysis stage (model, hashes, latency).
    pub metadata: BTreeMap<String, String>,
}

pub struct PlanGenerator<'g> {
    gateway: &'g LlmGateway,
    analysis_model: ModelSpec,
    structure_model: ModelSpec,
}

impl<'g> PlanGenerator<'g> {
    pub fn new(gateway: &'g LlmGateway, analysis_model: ModelSpec, structure_model: ModelSpec) -> Self {
        Self {
            gateway,
            analysis_model,
            structure_model,
        }
    }

    /// Override the sampling temperature on both stages. Used by the
    /// preference-pair builder to vary candidates.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.analysis_model.temperature = temperature;
        self.structure_model.temperature = temperature;
        self
    }

    /// Run the pipeline on one brief.
    pub async fn generate_plan(&self, brief: &str, want_structured: bool) -> Result<PlanGeneration> {
        let today = chrono::Local::now().date_naive().to_string();
        let analysis_prompt =
            prompts::render_pairs(prompts::ANALYSIS_TEMPLATE, &[("brief", brief), ("today", &today)]);

        let analysis = self
            .gateway
            .query_completion(self.analysis_model.provider, &self.analysis_model.request(analysis_prompt))
            .await?;
        tracing::debug!(
            latency_ms = analysis.latency_ms as u64,
            "analysis stage complete"
        );

        let mut generation = PlanGeneration {
            metadata: completion_metadata(&self.analysis_model, &analysis),
            analysis: analysis.content,
            structured: None,
        };

        if !want_structured {
            return Ok(generation);
        }

        let structure_prompt = prompts::render_pairs(
            prompts::STRUCTURE_TEMPLATE,
            &[
                ("analysis", generation.analysis.as_str()),
                ("schema", prompts::PLAN_SCHEMA),
            ],
        );
        let structured = self
            .gateway
            .query_completion(
                self.structure_model.provider,
                &self.structure_model.request(structure_prompt),
            )
            .await?;
        tracing::debug!(
            latency_ms = structured.latency_ms as u64,
            "structuring stage complete"
        );

        let value = extract_value(&structured.content)?;
        if !value.is_object() {
            return Err(PipelineError::SchemaError(
                "structuring stage did not produce a JSON object".to_string(),
            ));
        }
        let mut plan: Plan = serde_json::from_value(value)
            .map_err(|e| PipelineError::SchemaError(format!("plan does not match schema: {}", e)))?;
        plan.metadata = completion_metadata(&self.structure_model, &structured);
        generation.structured = Some(plan);
        Ok(generation)
    }
}

fn completion_metadata(spec: &ModelSpec, completion: &LlmCompletion) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("llm.model".to_string(), spec.model.clone());
    meta.insert("llm.provider".to_string(), spec.provider.to_string());
    meta.insert("llm.prompt_hash".to_string(), completion.prompt_hash.clone());
    meta.insert(
        "llm.response_hash".to_string(),
        completion.response_hash.clone(),
    );
    meta.insert(
        "llm.latency_ms".to_string(),
        completion.latency_ms.to_string(),
    );
    if let Some(tokens) = completion.total_tokens {
        meta.insert("llm.total_tokens".to_string(), tokens.to_string());
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GatewayConfig, LlmProviderConfig, LlmProviderType, StubLlmProvider};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_gateway() -> LlmGateway {
        let mut config = GatewayConfig::default();
        config.min_request_gap = Duration::from_millis(1);
        let stub = StubLlmProvider::new(LlmProviderConfig::new(LlmProviderType::Stub, "stub"));
        LlmGateway::new(config).with_provider(LlmProviderType::Stub, Arc::new(stub))
    }

    fn specs() -> (ModelSpec, ModelSpec) {
        (
            ModelSpec::new(LlmProviderType::Stub, "stub").with_temperature(1.0),
            ModelSpec::new(LlmProviderType::Stub, "stub"),
        )
    }

    #[tokio::test]
    async fn analysis_only_skips_structuring() {
        let gateway = test_gateway();
        let (a, s) = specs();
        let generator = PlanGenerator::new(&gateway, a, s);
        let out = generator.generate_plan("Plan the QBR", false).await.unwrap();
        assert!(!out.analysis.is_empty());
        assert!(out.structured.is_none());
    }

    #[tokio::test]
    async fn two_stage_generation_yields_a_plan() {
        let gateway = test_gateway();
        let (a, s) = specs();
        let generator = PlanGenerator::new(&gateway, a, s);
        let out = generator.generate_plan("Plan the QBR", true).await.unwrap();
        let plan = out.structured.unwrap();
        assert!(!plan.participants.is_empty());
        assert!(plan.metadata.contains_key("llm.response_hash"));
        assert_eq!(plan.violations(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn malformed_structuring_output_is_a_schema_error() {
        let mut config = GatewayConfig::default();
        config.min_request_gap = Duration::from_millis(1);
        let stub = StubLlmProvider::with_responses(
            LlmProviderConfig::new(LlmProviderType::Stub, "stub"),
            vec![
                "analysis text".to_string(),
                // Parses as JSON but is not a Plan.
                r#"{"not": "a plan"}"#.to_string(),
            ],
        );
        let gateway =
            LlmGateway::new(config).with_provider(LlmProviderType::Stub, Arc::new(stub));
        let (a, s) = specs();
        let generator = PlanGenerator::new(&gateway, a, s);
        let err = generator.generate_plan("brief", true).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaError(_)));
    }
}
