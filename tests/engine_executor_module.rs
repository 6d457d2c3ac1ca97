use pipewright::audit::UsageAudit;
use pipewright::config::{ModelSettings, PhaseConfigStore};
use pipewright::engine::{PhaseError, PhaseExecutor};
use pipewright::persistence::{
    prompt_fingerprint, PhaseConfigRecord, PhaseConfigRepository, PromptRepository,
    UsageRepository,
};
use pipewright::prompts::RolePromptAssembler;
use pipewright::provider::{
    CompletionRequest, CompletionResponse, ModelBackend, ModelInvoker, ProviderError,
};
use pipewright::shared::ids::RoleName;
use serde_json::{json, Map};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const NOW: &str = "2026-01-01T00:00:00+00:00";
const PM_PROMPT: &str = "You are the product manager. Produce a plan.";

struct RecordingBackend {
    seen: Arc<Mutex<Option<CompletionRequest>>>,
    text: String,
}

impl ModelBackend for RecordingBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        *self.seen.lock().expect("lock") = Some(request.clone());
        Ok(CompletionResponse {
            text: self.text.clone(),
            token_counts: None,
        })
    }
}

fn seed(db_path: &Path) {
    let configs = PhaseConfigRepository::open(db_path).expect("open configs");
    configs.ensure_schema().expect("configs schema");
    configs
        .insert_phase_config(&PhaseConfigRecord {
            phase_name: "pm".to_string(),
            role_name: "pm".to_string(),
            artifact_type: "pm_artifact".to_string(),
            next_phase: Some("architect".to_string()),
            active: true,
            created_at: NOW.to_string(),
        })
        .expect("insert config");

    let prompts = PromptRepository::open(db_path).expect("open prompts");
    prompts.ensure_schema().expect("prompts schema");
    let role = RoleName::parse("pm").expect("role name");
    prompts.insert_prompt(&role, PM_PROMPT, NOW).expect("insert prompt");
}

fn executor(db_path: &Path, backend: RecordingBackend) -> PhaseExecutor {
    let usage = UsageRepository::open(db_path).expect("open usage");
    usage.ensure_schema().expect("usage schema");
    PhaseExecutor::new(
        PhaseConfigStore::new(PhaseConfigRepository::open(db_path).expect("open configs")),
        Box::new(RolePromptAssembler::new(
            PromptRepository::open(db_path).expect("open prompts"),
        )),
        ModelInvoker::new(Box::new(backend)),
        UsageAudit::new(usage),
    )
}

#[test]
fn full_wiring_produces_the_artifact_and_a_fingerprinted_usage_row() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed(&db_path);

    let seen = Arc::new(Mutex::new(None));
    let executor = executor(
        &db_path,
        RecordingBackend {
            seen: Arc::clone(&seen),
            text: "```json\n{\"goals\": [\"ship\"]}\n```".to_string(),
        },
    );

    let state = Map::new();
    let artifacts = Map::new();
    let result = executor
        .execute("pipe-1", "pm", "build the widget", &state, &artifacts)
        .expect("execute");

    assert_eq!(result.artifact, json!({"goals": ["ship"]}));
    assert_eq!(result.artifact_type, "pm_artifact");
    assert_eq!(result.next_phase.as_deref(), Some("architect"));
    assert_eq!(result.prompt_id, prompt_fingerprint(PM_PROMPT));

    let usage = UsageRepository::open(&db_path).expect("open usage");
    let records = usage.records_for_pipeline("pipe-1").expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt_id, prompt_fingerprint(PM_PROMPT));
    assert_eq!(records[0].role_name, "pm");
    assert_eq!(records[0].phase_name, "pm");
}

#[test]
fn the_stored_role_prompt_and_pipeline_context_reach_the_model() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed(&db_path);

    let seen = Arc::new(Mutex::new(None));
    let executor = executor(
        &db_path,
        RecordingBackend {
            seen: Arc::clone(&seen),
            text: "{\"ok\": true}".to_string(),
        },
    );

    let mut state = Map::new();
    state.insert("current_phase".to_string(), json!("pm"));
    let mut artifacts = Map::new();
    artifacts.insert("epic_notes".to_string(), json!({"scope": "billing"}));
    executor
        .execute("pipe-1", "pm", "  build the widget  ", &state, &artifacts)
        .expect("execute");

    let request = seen.lock().expect("lock").clone().expect("request captured");
    assert_eq!(request.system_text, PM_PROMPT);
    assert!(request.user_text.starts_with("## Epic Context\nbuild the widget"));
    assert!(request.user_text.contains("\"current_phase\": \"pm\""));
    assert!(request.user_text.contains("epic_notes"));
    assert!(request.user_text.ends_with("Please proceed with this phase."));

    let defaults = ModelSettings::default();
    assert_eq!(request.model_id, defaults.model_id);
    assert_eq!(request.max_tokens, defaults.max_tokens);
}

#[test]
fn a_role_without_an_active_prompt_fails_before_the_model_is_called() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    let configs = PhaseConfigRepository::open(&db_path).expect("open configs");
    configs.ensure_schema().expect("configs schema");
    configs
        .insert_phase_config(&PhaseConfigRecord {
            phase_name: "pm".to_string(),
            role_name: "pm".to_string(),
            artifact_type: "pm_artifact".to_string(),
            next_phase: None,
            active: true,
            created_at: NOW.to_string(),
        })
        .expect("insert config");
    let prompts = PromptRepository::open(&db_path).expect("open prompts");
    prompts.ensure_schema().expect("prompts schema");

    let seen = Arc::new(Mutex::new(None));
    let executor = executor(
        &db_path,
        RecordingBackend {
            seen: Arc::clone(&seen),
            text: "{}".to_string(),
        },
    );

    let state = Map::new();
    let artifacts = Map::new();
    let err = executor
        .execute("pipe-1", "pm", "", &state, &artifacts)
        .expect_err("missing prompt");
    assert!(matches!(err, PhaseError::PromptBuild { .. }));
    assert!(err.to_string().contains("no active prompt for role: pm"));
    assert!(seen.lock().expect("lock").is_none());

    let usage = UsageRepository::open(&db_path).expect("open usage");
    assert!(usage.records_for_pipeline("pipe-1").expect("records").is_empty());
}

#[test]
fn model_setting_overrides_reach_the_outgoing_request() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("engine.db");
    seed(&db_path);

    let seen = Arc::new(Mutex::new(None));
    let executor = executor(
        &db_path,
        RecordingBackend {
            seen: Arc::clone(&seen),
            text: "Preamble.\n```json\n{\"sections\": [\"alpha\"]}\n```".to_string(),
        },
    )
    .with_model_settings(ModelSettings {
        max_tokens: 1024,
        ..ModelSettings::default()
    });

    let state = Map::new();
    let artifacts = Map::new();
    let result = executor
        .execute("pipe-1", "pm", "", &state, &artifacts)
        .expect("execute");
    assert_eq!(result.artifact, json!({"sections": ["alpha"]}));

    let request = seen.lock().expect("lock").clone().expect("request captured");
    assert_eq!(request.max_tokens, 1024);
}
