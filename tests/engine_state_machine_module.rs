use pipewright::audit::UsageAudit;
use pipewright::config::{EngineSettings, PhaseConfigStore};
use pipewright::engine::{PhaseExecutor, PipelineError, PipelineStateMachine};
use pipewright::persistence::{
    PhaseConfigRecord, PhaseConfigRepository, PipelineRepository, PipelineStatus,
    PromptRepository, UsageRepository,
};
use pipewright::prompts::RolePromptAssembler;
use pipewright::provider::{
    CompletionRequest, CompletionResponse, ModelBackend, ModelInvoker, ProviderError,
};
use pipewright::shared::ids::RoleName;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

const NOW: &str = "2026-01-01T00:00:00+00:00";

static INIT_LOGGING: Once = Once::new();

fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
                .init();
        }
    });
}

struct CannedBackend {
    reply: Result<String, String>,
}

impl ModelBackend for CannedBackend {
    fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        match &self.reply {
            Ok(text) => Ok(CompletionResponse {
                text: text.clone(),
                token_counts: None,
            }),
            Err(message) => Err(ProviderError::ApiRequest(message.clone())),
        }
    }
}

fn seed_phase(db_path: &Path, phase: &str, next: Option<&str>) {
    let configs = PhaseConfigRepository::open(db_path).expect("open configs");
    configs.ensure_schema().expect("configs schema");
    configs
        .insert_phase_config(&PhaseConfigRecord {
            phase_name: phase.to_string(),
            role_name: phase.to_string(),
            artifact_type: format!("{phase}_artifact"),
            next_phase: next.map(str::to_string),
            active: true,
            created_at: NOW.to_string(),
        })
        .expect("insert config");
}

fn seed_prompt(db_path: &Path, role: &str) {
    let prompts = PromptRepository::open(db_path).expect("open prompts");
    prompts.ensure_schema().expect("prompts schema");
    let role = RoleName::parse(role).expect("role name");
    prompts
        .insert_prompt(&role, &format!("You are the {} role.", role.as_str()), NOW)
        .expect("insert prompt");
}

fn machine_with_usage_at(
    db_path: &Path,
    usage_path: &Path,
    entry_phase: &str,
    data_driven: bool,
    reply: Result<String, String>,
) -> PipelineStateMachine {
    let pipelines = PipelineRepository::open(db_path).expect("open pipelines");
    pipelines.ensure_schema().expect("pipelines schema");
    let prompts = PromptRepository::open(db_path).expect("open prompts");
    prompts.ensure_schema().expect("prompts schema");
    let usage = UsageRepository::open(usage_path).expect("open usage");
    usage.ensure_schema().expect("usage schema");

    let executor = PhaseExecutor::new(
        PhaseConfigStore::new(PhaseConfigRepository::open(db_path).expect("open configs")),
        Box::new(RolePromptAssembler::new(prompts)),
        ModelInvoker::new(Box::new(CannedBackend { reply })),
        UsageAudit::new(usage),
    );
    PipelineStateMachine::new(
        pipelines,
        PhaseConfigStore::new(PhaseConfigRepository::open(db_path).expect("open configs")),
        executor,
        EngineSettings {
            data_driven,
            max_phase_hops: 20,
        },
        entry_phase.to_string(),
    )
}

fn machine(db_path: &Path, entry_phase: &str, reply: Result<String, String>) -> PipelineStateMachine {
    machine_with_usage_at(db_path, db_path, entry_phase, true, reply)
}

#[test]
fn a_two_phase_pipeline_runs_to_completion() {
    init_test_logging();
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed_phase(&db_path, "design", Some("review"));
    seed_phase(&db_path, "review", None);
    seed_prompt(&db_path, "design");
    seed_prompt(&db_path, "review");

    let machine = machine(&db_path, "design", Ok("{\"verdict\": \"good\"}".to_string()));
    let record = machine
        .start("epic-1", json!({"epic_description": "build the widget"}))
        .expect("start");

    let first = machine.advance(&record.pipeline_id).expect("first advance");
    assert_eq!(first.pipeline.current_phase, "review");
    assert_eq!(first.pipeline.status, PipelineStatus::Active);
    assert!(first.pipeline.artifacts.contains_key("design_artifact"));
    let execution = first.execution.expect("execution result");
    assert_eq!(execution.artifact_type, "design_artifact");

    let second = machine.advance(&record.pipeline_id).expect("second advance");
    assert_eq!(second.pipeline.status, PipelineStatus::Complete);
    assert!(second.pipeline.completed_at.is_some());
    assert_eq!(second.pipeline.current_phase, "review");
    assert!(second.pipeline.artifacts.contains_key("review_artifact"));

    let report = machine.status(&record.pipeline_id).expect("status");
    assert_eq!(report.transitions.len(), 2);
    assert_eq!(report.transitions[0].from_phase, "design");
    assert_eq!(report.transitions[0].to_phase, "review");
    assert_eq!(report.transitions[1].from_phase, "review");
    assert_eq!(report.transitions[1].to_phase, "review");
    for transition in &report.transitions {
        assert_eq!(transition.reason, "phase execution");
    }

    let usage = UsageRepository::open(&db_path).expect("open usage");
    assert_eq!(
        usage
            .records_for_pipeline(&record.pipeline_id)
            .expect("records")
            .len(),
        2
    );

    let err = machine.advance(&record.pipeline_id).expect_err("terminal");
    assert!(matches!(err, PipelineError::PhaseTerminal { .. }));
}

#[test]
fn every_stage_failure_leaves_the_stored_row_untouched() {
    let dir = tempdir().expect("tempdir");

    // Missing phase config.
    let no_config = dir.path().join("no_config.db");
    let configs = PhaseConfigRepository::open(&no_config).expect("open configs");
    configs.ensure_schema().expect("configs schema");
    let machine_a = machine(&no_config, "design", Ok("{}".to_string()));
    let record = machine_a.start("epic-1", json!({})).expect("start");
    let before = machine_a.status(&record.pipeline_id).expect("status");
    let err = machine_a.advance(&record.pipeline_id).expect_err("advance");
    assert!(matches!(
        err,
        PipelineError::Phase(pipewright::engine::PhaseError::Configuration { .. })
    ));
    assert_eq!(machine_a.status(&record.pipeline_id).expect("status"), before);

    // Missing role prompt.
    let no_prompt = dir.path().join("no_prompt.db");
    seed_phase(&no_prompt, "design", None);
    let machine_b = machine(&no_prompt, "design", Ok("{}".to_string()));
    let record = machine_b.start("epic-1", json!({})).expect("start");
    let before = machine_b.status(&record.pipeline_id).expect("status");
    let err = machine_b.advance(&record.pipeline_id).expect_err("advance");
    assert!(matches!(
        err,
        PipelineError::Phase(pipewright::engine::PhaseError::PromptBuild { .. })
    ));
    assert_eq!(machine_b.status(&record.pipeline_id).expect("status"), before);

    // Backend fault.
    let backend_fault = dir.path().join("backend_fault.db");
    seed_phase(&backend_fault, "design", None);
    seed_prompt(&backend_fault, "design");
    let machine_c = machine(
        &backend_fault,
        "design",
        Err("connection refused".to_string()),
    );
    let record = machine_c.start("epic-1", json!({})).expect("start");
    let before = machine_c.status(&record.pipeline_id).expect("status");
    let err = machine_c.advance(&record.pipeline_id).expect_err("advance");
    assert!(matches!(
        err,
        PipelineError::Phase(pipewright::engine::PhaseError::Model { .. })
    ));
    assert_eq!(machine_c.status(&record.pipeline_id).expect("status"), before);

    // Unparseable model output.
    let bad_output = dir.path().join("bad_output.db");
    seed_phase(&bad_output, "design", None);
    seed_prompt(&bad_output, "design");
    let machine_d = machine(&bad_output, "design", Ok("no json here".to_string()));
    let record = machine_d.start("epic-1", json!({})).expect("start");
    let before = machine_d.status(&record.pipeline_id).expect("status");
    let err = machine_d.advance(&record.pipeline_id).expect_err("advance");
    assert!(matches!(
        err,
        PipelineError::Phase(pipewright::engine::PhaseError::Parse { .. })
    ));
    assert_eq!(machine_d.status(&record.pipeline_id).expect("status"), before);
}

#[test]
fn a_broken_usage_store_never_blocks_an_advance() {
    init_test_logging();
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    let usage_path = dir.path().join("usage.db");
    seed_phase(&db_path, "design", None);
    seed_prompt(&db_path, "design");

    let machine = machine_with_usage_at(
        &db_path,
        &usage_path,
        "design",
        true,
        Ok("{\"done\": true}".to_string()),
    );
    let record = machine.start("epic-1", json!({})).expect("start");

    // Replace the usage database with a directory so every later write
    // fails to open it.
    fs::remove_file(&usage_path).expect("remove usage db");
    fs::create_dir(&usage_path).expect("block usage path");

    let outcome = machine.advance(&record.pipeline_id).expect("advance");
    assert_eq!(outcome.pipeline.status, PipelineStatus::Complete);
    assert!(outcome.pipeline.artifacts.contains_key("design_artifact"));
}

#[test]
fn a_vanished_next_phase_aborts_and_reports_the_cause() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed_phase(&db_path, "design", Some("review"));
    seed_prompt(&db_path, "design");

    let machine = machine(&db_path, "design", Ok("{\"ok\": true}".to_string()));
    let record = machine.start("epic-1", json!({})).expect("start");

    let before = machine.status(&record.pipeline_id).expect("status");
    let err = machine.advance(&record.pipeline_id).expect_err("advance");
    match err {
        PipelineError::NextPhaseVanished { next_phase, reason } => {
            assert_eq!(next_phase, "review");
            assert!(reason.contains("review"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(machine.status(&record.pipeline_id).expect("status"), before);
}

#[test]
fn legacy_mode_walks_the_hardcoded_sequence_to_completion() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");

    let machine = machine_with_usage_at(&db_path, &db_path, "idle", false, Ok("{}".to_string()));
    let record = machine.start("epic-1", json!({})).expect("start");

    let expected = ["pm", "architect", "ba", "developer", "qa", "commit", "complete"];
    for phase in expected {
        let outcome = machine.advance(&record.pipeline_id).expect("advance");
        assert_eq!(outcome.pipeline.current_phase, phase);
        assert!(outcome.execution.is_none());
    }

    let report = machine.status(&record.pipeline_id).expect("status");
    assert_eq!(report.pipeline.status, PipelineStatus::Complete);
    assert!(report.pipeline.completed_at.is_some());
    assert_eq!(report.transitions.len(), expected.len());
    for transition in &report.transitions {
        assert_eq!(transition.reason, "legacy advancement");
    }

    let usage = UsageRepository::open(&db_path).expect("open usage");
    assert!(usage
        .records_for_pipeline(&record.pipeline_id)
        .expect("records")
        .is_empty());
}

#[test]
fn mark_failed_requires_an_active_pipeline() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed_phase(&db_path, "design", None);
    seed_prompt(&db_path, "design");

    let machine = machine(&db_path, "design", Ok("{\"done\": true}".to_string()));
    let record = machine.start("epic-1", json!({})).expect("start");
    machine.advance(&record.pipeline_id).expect("advance");

    let err = machine
        .mark_failed(&record.pipeline_id, "operator abort")
        .expect_err("already complete");
    assert!(matches!(err, PipelineError::PhaseTerminal { .. }));

    let fresh = machine.start("epic-2", json!({})).expect("start");
    let failed = machine
        .mark_failed(&fresh.pipeline_id, "operator abort")
        .expect("mark failed");
    assert_eq!(failed.status, PipelineStatus::Failed);
    let report = machine.status(&fresh.pipeline_id).expect("status");
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].reason, "operator abort");
    assert_eq!(report.transitions[0].from_phase, report.transitions[0].to_phase);
}
