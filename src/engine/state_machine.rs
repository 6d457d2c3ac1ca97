use super::error::PipelineError;
use super::executor::{ExecutionResult, PhaseExecutor};
use super::legacy;
use crate::config::{EngineMode, EngineSettings, PhaseConfigStore};
use crate::persistence::{
    PipelineRecord, PipelineRepository, PipelineStatus, StoreError, TransitionRecord,
};
use crate::shared::clock::{now_rfc3339, unix_timestamp};
use crate::shared::ids::allocate_pipeline_id_with_retry;
use serde_json::{json, Map, Value};
use tracing::info;

pub const ADVANCE_REASON: &str = "phase execution";

#[derive(Debug)]
pub struct AdvanceOutcome {
    /// The pipeline row as committed by this advance.
    pub pipeline: PipelineRecord,
    /// Present on the data-driven path only.
    pub execution: Option<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub pipeline: PipelineRecord,
    pub transitions: Vec<TransitionRecord>,
}

/// Owns pipeline lifecycle: creation, one-phase advancement, explicit
/// failure, and status reads. Every committed change lands with its
/// transition row in a single transaction; a failing advance leaves the
/// stored row untouched.
pub struct PipelineStateMachine {
    pipelines: PipelineRepository,
    config_store: PhaseConfigStore,
    executor: PhaseExecutor,
    engine: EngineSettings,
    entry_phase: String,
}

impl PipelineStateMachine {
    pub fn new(
        pipelines: PipelineRepository,
        config_store: PhaseConfigStore,
        executor: PhaseExecutor,
        engine: EngineSettings,
        entry_phase: String,
    ) -> Self {
        Self {
            pipelines,
            config_store,
            executor,
            engine,
            entry_phase,
        }
    }

    /// Creates an active pipeline at the configured entry phase.
    pub fn start(
        &self,
        epic_id: &str,
        initial_context: Value,
    ) -> Result<PipelineRecord, PipelineError> {
        let pipeline_id = allocate_pipeline_id_with_retry(unix_timestamp(), |candidate| {
            // An unreadable store counts as a collision so allocation keeps
            // retrying instead of handing out a possibly duplicate id.
            self.pipelines.exists(candidate).unwrap_or(true)
        })
        .map_err(|reason| PipelineError::IdAllocation { reason })?;

        let now = now_rfc3339();
        let record = PipelineRecord {
            pipeline_id: pipeline_id.as_str().to_string(),
            epic_id: epic_id.to_string(),
            status: PipelineStatus::Active,
            current_phase: self.entry_phase.clone(),
            initial_context,
            artifacts: Map::new(),
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        };
        self.pipelines.create(&record).map_err(storage)?;
        info!(
            pipeline_id = record.pipeline_id,
            epic_id,
            entry_phase = record.current_phase,
            "pipeline started"
        );
        Ok(record)
    }

    /// Advances the pipeline by exactly one phase. The engine mode is
    /// resolved once here and holds for the whole call.
    pub fn advance(&self, pipeline_id: &str) -> Result<AdvanceOutcome, PipelineError> {
        let mode = EngineMode::resolve(&self.engine);
        let pipeline = self.load(pipeline_id)?;
        if pipeline.status != PipelineStatus::Active {
            return Err(PipelineError::PhaseTerminal {
                pipeline_id: pipeline_id.to_string(),
                status: pipeline.status,
            });
        }

        match mode {
            EngineMode::DataDriven => self.advance_data_driven(pipeline),
            EngineMode::Legacy => self.advance_legacy(pipeline),
        }
    }

    /// Explicit `active -> failed` transition. A failing `advance` never
    /// takes this path on its own.
    pub fn mark_failed(
        &self,
        pipeline_id: &str,
        reason: &str,
    ) -> Result<PipelineRecord, PipelineError> {
        let pipeline = self.load(pipeline_id)?;
        if !pipeline.status.can_transition_to(PipelineStatus::Failed) {
            return Err(PipelineError::PhaseTerminal {
                pipeline_id: pipeline_id.to_string(),
                status: pipeline.status,
            });
        }

        let now = now_rfc3339();
        let mut updated = pipeline.clone();
        updated.status = PipelineStatus::Failed;
        updated.updated_at = now.clone();
        let transition = TransitionRecord {
            pipeline_id: pipeline.pipeline_id.clone(),
            from_phase: pipeline.current_phase.clone(),
            to_phase: pipeline.current_phase.clone(),
            reason: reason.to_string(),
            occurred_at: now,
        };
        self.pipelines
            .commit_with_transition(&updated, &transition)
            .map_err(storage)?;
        info!(pipeline_id, reason, "pipeline marked failed");
        Ok(updated)
    }

    pub fn status(&self, pipeline_id: &str) -> Result<StatusReport, PipelineError> {
        let pipeline = self.load(pipeline_id)?;
        let transitions = self.pipelines.transitions_for(pipeline_id).map_err(storage)?;
        Ok(StatusReport {
            pipeline,
            transitions,
        })
    }

    fn load(&self, pipeline_id: &str) -> Result<PipelineRecord, PipelineError> {
        self.pipelines
            .get(pipeline_id)
            .map_err(storage)?
            .ok_or_else(|| PipelineError::UnknownPipeline {
                pipeline_id: pipeline_id.to_string(),
            })
    }

    fn advance_data_driven(
        &self,
        pipeline: PipelineRecord,
    ) -> Result<AdvanceOutcome, PipelineError> {
        let epic_context = pipeline
            .initial_context
            .get("epic_description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let pipeline_state = state_view(&pipeline);

        let result = self.executor.execute(
            &pipeline.pipeline_id,
            &pipeline.current_phase,
            &epic_context,
            &pipeline_state,
            &pipeline.artifacts,
        )?;

        // Config drift between execution and commit aborts the advance; the
        // stored row has not been touched yet.
        if let Some(next_phase) = &result.next_phase {
            self.config_store
                .load(next_phase)
                .map_err(|err| PipelineError::NextPhaseVanished {
                    next_phase: next_phase.clone(),
                    reason: err.to_string(),
                })?;
        }

        let now = now_rfc3339();
        let mut updated = pipeline.clone();
        updated
            .artifacts
            .insert(result.artifact_type.clone(), result.artifact.clone());
        updated.updated_at = now.clone();
        let to_phase = match &result.next_phase {
            Some(next) => {
                updated.current_phase = next.clone();
                next.clone()
            }
            None => {
                updated.status = PipelineStatus::Complete;
                updated.completed_at = Some(now.clone());
                pipeline.current_phase.clone()
            }
        };
        let transition = TransitionRecord {
            pipeline_id: pipeline.pipeline_id.clone(),
            from_phase: pipeline.current_phase.clone(),
            to_phase,
            reason: ADVANCE_REASON.to_string(),
            occurred_at: now,
        };
        self.pipelines
            .commit_with_transition(&updated, &transition)
            .map_err(storage)?;

        info!(
            pipeline_id = updated.pipeline_id,
            from_phase = pipeline.current_phase,
            to_phase = updated.current_phase,
            status = %updated.status,
            "pipeline advanced"
        );
        Ok(AdvanceOutcome {
            pipeline: updated,
            execution: Some(result),
        })
    }

    fn advance_legacy(&self, pipeline: PipelineRecord) -> Result<AdvanceOutcome, PipelineError> {
        let next = legacy::next_phase(&pipeline.current_phase).ok_or_else(|| {
            PipelineError::InvalidTransition {
                pipeline_id: pipeline.pipeline_id.clone(),
                from_phase: pipeline.current_phase.clone(),
            }
        })?;

        let now = now_rfc3339();
        let mut updated = pipeline.clone();
        updated.current_phase = next.to_string();
        updated.updated_at = now.clone();
        if legacy::is_final(next) {
            updated.status = PipelineStatus::Complete;
            updated.completed_at = Some(now.clone());
        }
        let transition = TransitionRecord {
            pipeline_id: pipeline.pipeline_id.clone(),
            from_phase: pipeline.current_phase.clone(),
            to_phase: next.to_string(),
            reason: legacy::LEGACY_ADVANCE_REASON.to_string(),
            occurred_at: now,
        };
        self.pipelines
            .commit_with_transition(&updated, &transition)
            .map_err(storage)?;

        info!(
            pipeline_id = updated.pipeline_id,
            from_phase = pipeline.current_phase,
            to_phase = next,
            "pipeline advanced (legacy sequence)"
        );
        Ok(AdvanceOutcome {
            pipeline: updated,
            execution: None,
        })
    }
}

fn storage(source: StoreError) -> PipelineError {
    PipelineError::Storage { source }
}

fn state_view(pipeline: &PipelineRecord) -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("pipeline_id".to_string(), json!(pipeline.pipeline_id));
    state.insert("epic_id".to_string(), json!(pipeline.epic_id));
    state.insert("current_phase".to_string(), json!(pipeline.current_phase));
    state.insert("status".to_string(), json!(pipeline.status.as_str()));
    state
}
