use super::error::{json_column_error, sql_error, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Active,
    Complete,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "active" => Ok(Self::Active),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }

    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Complete) | (Self::Active, Self::Failed)
        )
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub pipeline_id: String,
    pub epic_id: String,
    pub status: PipelineStatus,
    pub current_phase: String,
    pub initial_context: Value,
    pub artifacts: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub pipeline_id: String,
    pub from_phase: String,
    pub to_phase: String,
    pub reason: String,
    pub occurred_at: String,
}

#[derive(Debug)]
pub struct PipelineRepository {
    db_path: PathBuf,
}

impl PipelineRepository {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let repo = Self {
            db_path: db_path.to_path_buf(),
        };

        // Ensure open is valid now to fail fast.
        let _ = repo.connect()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS pipelines (
                    pipeline_id TEXT PRIMARY KEY,
                    epic_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    current_phase TEXT NOT NULL,
                    initial_context TEXT NOT NULL,
                    artifacts TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS phase_transitions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pipeline_id TEXT NOT NULL,
                    from_phase TEXT NOT NULL,
                    to_phase TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    occurred_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_phase_transitions_pipeline
                    ON phase_transitions(pipeline_id, id);
                ",
            )
            .map_err(sql_error)
    }

    pub fn create(&self, record: &PipelineRecord) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO pipelines (
                    pipeline_id, epic_id, status, current_phase,
                    initial_context, artifacts, created_at, updated_at, completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.pipeline_id,
                    record.epic_id,
                    record.status.as_str(),
                    record.current_phase,
                    encode_json(&record.initial_context, "initial_context")?,
                    encode_map(&record.artifacts, "artifacts")?,
                    record.created_at,
                    record.updated_at,
                    record.completed_at,
                ],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    pub fn get(&self, pipeline_id: &str) -> Result<Option<PipelineRecord>, StoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                "SELECT pipeline_id, epic_id, status, current_phase,
                        initial_context, artifacts, created_at, updated_at, completed_at
                 FROM pipelines WHERE pipeline_id = ?1",
                params![pipeline_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_error)?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        Ok(Some(decode_pipeline_row(raw)?))
    }

    pub fn exists(&self, pipeline_id: &str) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM pipelines WHERE pipeline_id = ?1",
                params![pipeline_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        Ok(found.is_some())
    }

    /// Persists an updated pipeline row and its transition record in one
    /// transaction. Either both land or neither does.
    pub fn commit_with_transition(
        &self,
        updated: &PipelineRecord,
        transition: &TransitionRecord,
    ) -> Result<(), StoreError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction().map_err(sql_error)?;
        tx.execute(
            "UPDATE pipelines SET
                epic_id = ?2, status = ?3, current_phase = ?4,
                initial_context = ?5, artifacts = ?6,
                created_at = ?7, updated_at = ?8, completed_at = ?9
             WHERE pipeline_id = ?1",
            params![
                updated.pipeline_id,
                updated.epic_id,
                updated.status.as_str(),
                updated.current_phase,
                encode_json(&updated.initial_context, "initial_context")?,
                encode_map(&updated.artifacts, "artifacts")?,
                updated.created_at,
                updated.updated_at,
                updated.completed_at,
            ],
        )
        .map_err(sql_error)?;
        tx.execute(
            "INSERT INTO phase_transitions (pipeline_id, from_phase, to_phase, reason, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                transition.pipeline_id,
                transition.from_phase,
                transition.to_phase,
                transition.reason,
                transition.occurred_at,
            ],
        )
        .map_err(sql_error)?;
        tx.commit().map_err(sql_error)
    }

    pub fn transitions_for(&self, pipeline_id: &str) -> Result<Vec<TransitionRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT pipeline_id, from_phase, to_phase, reason, occurred_at
                 FROM phase_transitions WHERE pipeline_id = ?1 ORDER BY id ASC",
            )
            .map_err(sql_error)?;
        let rows = statement
            .query_map(params![pipeline_id], |row| {
                Ok(TransitionRecord {
                    pipeline_id: row.get(0)?,
                    from_phase: row.get(1)?,
                    to_phase: row.get(2)?,
                    reason: row.get(3)?,
                    occurred_at: row.get(4)?,
                })
            })
            .map_err(sql_error)?;

        let mut transitions = Vec::new();
        for row in rows {
            transitions.push(row.map_err(sql_error)?);
        }
        Ok(transitions)
    }
}

fn encode_json(value: &Value, column: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| json_column_error(column, source))
}

fn encode_map(map: &Map<String, Value>, column: &str) -> Result<String, StoreError> {
    serde_json::to_string(map).map_err(|source| json_column_error(column, source))
}

#[allow(clippy::type_complexity)]
fn decode_pipeline_row(
    raw: (
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        Option<String>,
    ),
) -> Result<PipelineRecord, StoreError> {
    let (
        pipeline_id,
        epic_id,
        status,
        current_phase,
        initial_context,
        artifacts,
        created_at,
        updated_at,
        completed_at,
    ) = raw;
    Ok(PipelineRecord {
        pipeline_id,
        epic_id,
        status: PipelineStatus::parse(&status)?,
        current_phase,
        initial_context: serde_json::from_str(&initial_context)
            .map_err(|source| json_column_error("initial_context", source))?,
        artifacts: serde_json::from_str(&artifacts)
            .map_err(|source| json_column_error("artifacts", source))?,
        created_at,
        updated_at,
        completed_at,
    })
}
