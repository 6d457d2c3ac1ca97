use super::error::{sql_error, StoreError};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub pipeline_id: String,
    pub prompt_id: String,
    pub role_name: String,
    pub phase_name: String,
    pub used_at: String,
}

pub struct UsageRepository {
    db_path: PathBuf,
}

impl UsageRepository {
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
                CREATE TABLE IF NOT EXISTS usage_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pipeline_id TEXT NOT NULL,
                    prompt_id TEXT NOT NULL,
                    role_name TEXT NOT NULL,
                    phase_name TEXT NOT NULL,
                    used_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_usage_records_pipeline
                    ON usage_records(pipeline_id, id);
                ",
            )
            .map_err(sql_error)
    }

    pub fn insert(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO usage_records (pipeline_id, prompt_id, role_name, phase_name, used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.pipeline_id,
                    record.prompt_id,
                    record.role_name,
                    record.phase_name,
                    record.used_at,
                ],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    pub fn records_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<UsageRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT pipeline_id, prompt_id, role_name, phase_name, used_at
                 FROM usage_records WHERE pipeline_id = ?1 ORDER BY id ASC",
            )
            .map_err(sql_error)?;
        let rows = statement
            .query_map(params![pipeline_id], |row| {
                Ok(UsageRecord {
                    pipeline_id: row.get(0)?,
                    prompt_id: row.get(1)?,
                    role_name: row.get(2)?,
                    phase_name: row.get(3)?,
                    used_at: row.get(4)?,
                })
            })
            .map_err(sql_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(sql_error)?);
        }
        Ok(records)
    }
}
