use crate::persistence::{PromptRepository, StoreError};
use serde_json::{Map, Value};
use tracing::debug;

const CLOSING_INSTRUCTION: &str = "Please proceed with this phase.";

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("no active prompt for role: {role_name}")]
    NoActivePrompt { role_name: String },
    #[error("failed to load role prompt: {source}")]
    Storage {
        #[source]
        source: StoreError,
    },
}

/// Everything a phase contributes to its prompt. Maps are borrowed; the
/// assembler never mutates caller state.
pub struct PromptInput<'a> {
    pub role_name: &'a str,
    pub pipeline_id: &'a str,
    pub phase_name: &'a str,
    pub epic_context: &'a str,
    pub pipeline_state: &'a Map<String, Value>,
    pub artifacts: &'a Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system_text: String,
    pub user_text: String,
    pub prompt_id: String,
}

pub trait PromptAssembler {
    fn build(&self, input: &PromptInput<'_>) -> Result<BuiltPrompt, PromptError>;
}

/// Builds prompts from the active role prompt row: the prompt body becomes
/// the system text, the pipeline context is rendered into sectioned user
/// text.
pub struct RolePromptAssembler {
    prompts: PromptRepository,
}

impl RolePromptAssembler {
    pub fn new(prompts: PromptRepository) -> Self {
        Self { prompts }
    }
}

impl PromptAssembler for RolePromptAssembler {
    fn build(&self, input: &PromptInput<'_>) -> Result<BuiltPrompt, PromptError> {
        let record = self
            .prompts
            .active_prompt_for_role(input.role_name)
            .map_err(|source| PromptError::Storage { source })?
            .ok_or_else(|| PromptError::NoActivePrompt {
                role_name: input.role_name.to_string(),
            })?;

        let user_text = render_user_text(input);
        debug!(
            pipeline_id = input.pipeline_id,
            phase_name = input.phase_name,
            role_name = input.role_name,
            prompt_id = record.prompt_id,
            "assembled phase prompt"
        );

        Ok(BuiltPrompt {
            system_text: record.body,
            user_text,
            prompt_id: record.prompt_id,
        })
    }
}

fn render_user_text(input: &PromptInput<'_>) -> String {
    let state = Value::Object(input.pipeline_state.clone());
    let artifacts = Value::Object(input.artifacts.clone());
    format!(
        "## Epic Context\n{}\n\n## Pipeline State\n{state:#}\n\n## Prior Artifacts\n{artifacts:#}\n\n{CLOSING_INSTRUCTION}",
        input.epic_context.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ids::RoleName;
    use serde_json::json;
    use tempfile::tempdir;

    fn input_with<'a>(
        state: &'a Map<String, Value>,
        artifacts: &'a Map<String, Value>,
    ) -> PromptInput<'a> {
        PromptInput {
            role_name: "pm",
            pipeline_id: "pipe-100-aaaa",
            phase_name: "pm",
            epic_context: "Build a billing service.",
            pipeline_state: state,
            artifacts,
        }
    }

    #[test]
    fn build_uses_the_active_role_prompt_as_system_text() {
        let dir = tempdir().unwrap();
        let repo = PromptRepository::open(&dir.path().join("engine.db")).unwrap();
        repo.ensure_schema().unwrap();
        let role = RoleName::parse("pm").unwrap();
        let stored = repo
            .insert_prompt(&role, "You are the product manager.", "2026-01-01T00:00:00+00:00")
            .unwrap();

        let state = Map::new();
        let mut artifacts = Map::new();
        artifacts.insert("pm_artifact".to_string(), json!({"goals": ["ship"]}));

        let assembler = RolePromptAssembler::new(repo);
        let built = assembler.build(&input_with(&state, &artifacts)).unwrap();

        assert_eq!(built.system_text, "You are the product manager.");
        assert_eq!(built.prompt_id, stored.prompt_id);
        assert!(built.user_text.starts_with("## Epic Context\nBuild a billing service."));
        assert!(built.user_text.contains("## Pipeline State"));
        assert!(built.user_text.contains("## Prior Artifacts"));
        assert!(built.user_text.contains("pm_artifact"));
        assert!(built.user_text.ends_with("Please proceed with this phase."));
    }

    #[test]
    fn build_fails_when_the_role_has_no_active_prompt() {
        let dir = tempdir().unwrap();
        let repo = PromptRepository::open(&dir.path().join("engine.db")).unwrap();
        repo.ensure_schema().unwrap();

        let state = Map::new();
        let artifacts = Map::new();
        let assembler = RolePromptAssembler::new(repo);
        let err = assembler.build(&input_with(&state, &artifacts)).unwrap_err();
        assert!(matches!(err, PromptError::NoActivePrompt { role_name } if role_name == "pm"));
    }

    #[test]
    fn user_text_renders_state_and_artifacts_as_pretty_json() {
        let mut state = Map::new();
        state.insert("status".to_string(), json!("active"));
        let artifacts = Map::new();
        let rendered = render_user_text(&input_with(&state, &artifacts));
        assert!(rendered.contains("\"status\": \"active\""));
        assert!(rendered.contains("## Prior Artifacts\n{}"));
    }
}
