use super::error::PhaseError;
use crate::audit::UsageAudit;
use crate::config::{ModelSettings, PhaseConfigStore};
use crate::extract::ResponseExtractor;
use crate::prompts::{PromptAssembler, PromptError, PromptInput};
use crate::provider::{CompletionRequest, ModelInvoker};
use serde_json::{Map, Value};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub artifact: Value,
    pub artifact_type: String,
    pub next_phase: Option<String>,
    pub prompt_id: String,
    pub raw_response: String,
    pub elapsed_ms: u64,
}

/// Runs one phase end to end: load config, build the prompt, invoke the
/// model, recover the artifact, record usage. Stages run strictly in order
/// and the first failure ends the call. Caller state is borrowed read-only;
/// nothing here mutates it.
pub struct PhaseExecutor {
    config_store: PhaseConfigStore,
    assembler: Box<dyn PromptAssembler>,
    invoker: ModelInvoker,
    audit: UsageAudit,
    extractor: ResponseExtractor,
    model: ModelSettings,
}

impl PhaseExecutor {
    pub fn new(
        config_store: PhaseConfigStore,
        assembler: Box<dyn PromptAssembler>,
        invoker: ModelInvoker,
        audit: UsageAudit,
    ) -> Self {
        Self {
            config_store,
            assembler,
            invoker,
            audit,
            extractor: ResponseExtractor::with_default_strategies(),
            model: ModelSettings::default(),
        }
    }

    pub fn with_model_settings(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    pub fn with_extractor(mut self, extractor: ResponseExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn execute(
        &self,
        pipeline_id: &str,
        phase_name: &str,
        epic_context: &str,
        pipeline_state: &Map<String, Value>,
        artifacts: &Map<String, Value>,
    ) -> Result<ExecutionResult, PhaseError> {
        let config = self.config_store.load(phase_name).map_err(|err| {
            PhaseError::Configuration {
                pipeline_id: pipeline_id.to_string(),
                phase_name: phase_name.to_string(),
                reason: err.to_string(),
            }
        })?;

        let input = PromptInput {
            role_name: &config.role_name,
            pipeline_id,
            phase_name,
            epic_context,
            pipeline_state,
            artifacts,
        };
        let prompt = self.assembler.build(&input).map_err(|err| match err {
            PromptError::NoActivePrompt { .. } => PhaseError::PromptBuild {
                pipeline_id: pipeline_id.to_string(),
                phase_name: phase_name.to_string(),
                reason: err.to_string(),
            },
            other => {
                error!(
                    pipeline_id,
                    phase_name,
                    error = %other,
                    "prompt assembly hit an internal fault"
                );
                PhaseError::Execution {
                    pipeline_id: pipeline_id.to_string(),
                    phase_name: phase_name.to_string(),
                    reason: other.to_string(),
                }
            }
        })?;

        let request = CompletionRequest {
            model_id: self.model.model_id.clone(),
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
            system_text: prompt.system_text,
            user_text: prompt.user_text,
        };
        let outcome = self.invoker.invoke(&request);
        if !outcome.success {
            return Err(PhaseError::Model {
                pipeline_id: pipeline_id.to_string(),
                phase_name: phase_name.to_string(),
                reason: outcome
                    .error
                    .unwrap_or_else(|| "model returned no output".to_string()),
            });
        }

        let parsed = self.extractor.parse(&outcome.raw_text);
        let Some(artifact) = parsed.data else {
            return Err(PhaseError::Parse {
                pipeline_id: pipeline_id.to_string(),
                phase_name: phase_name.to_string(),
                reason: parsed.diagnostics.join("; "),
            });
        };

        // Best-effort: a usage write failure must never fail the phase.
        self.audit
            .record(pipeline_id, &prompt.prompt_id, &config.role_name, phase_name);

        debug!(
            pipeline_id,
            phase_name,
            artifact_type = config.artifact_type,
            strategy = parsed.strategy_used.as_deref().unwrap_or(""),
            elapsed_ms = outcome.elapsed_ms,
            "phase executed"
        );

        Ok(ExecutionResult {
            artifact,
            artifact_type: config.artifact_type,
            next_phase: config.next_phase,
            prompt_id: prompt.prompt_id,
            raw_response: outcome.raw_text,
            elapsed_ms: outcome.elapsed_ms,
        })
    }
}
