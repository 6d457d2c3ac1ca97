use crate::persistence::{PipelineStatus, StoreError};

/// Phase-level failures. Every variant names the pipeline and phase so a
/// single log line identifies the failing execution.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("[{pipeline_id}:{phase_name}] configuration error: {reason}")]
    Configuration {
        pipeline_id: String,
        phase_name: String,
        reason: String,
    },
    #[error("[{pipeline_id}:{phase_name}] prompt build failed: {reason}")]
    PromptBuild {
        pipeline_id: String,
        phase_name: String,
        reason: String,
    },
    #[error("[{pipeline_id}:{phase_name}] model invocation failed: {reason}")]
    Model {
        pipeline_id: String,
        phase_name: String,
        reason: String,
    },
    #[error("[{pipeline_id}:{phase_name}] response parse failed: {reason}")]
    Parse {
        pipeline_id: String,
        phase_name: String,
        reason: String,
    },
    #[error("[{pipeline_id}:{phase_name}] phase execution failed: {reason}")]
    Execution {
        pipeline_id: String,
        phase_name: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline not found: {pipeline_id}")]
    UnknownPipeline { pipeline_id: String },
    #[error("pipeline {pipeline_id} is {status}; only active pipelines can advance")]
    PhaseTerminal {
        pipeline_id: String,
        status: PipelineStatus,
    },
    #[error("pipeline {pipeline_id}: no legal transition from phase `{from_phase}`")]
    InvalidTransition {
        pipeline_id: String,
        from_phase: String,
    },
    #[error("next phase `{next_phase}` has no active config: {reason}")]
    NextPhaseVanished { next_phase: String, reason: String },
    #[error("failed to allocate pipeline id: {reason}")]
    IdAllocation { reason: String },
    #[error("pipeline storage error: {source}")]
    Storage {
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Phase(#[from] PhaseError),
}
