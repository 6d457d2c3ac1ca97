use super::error::{sql_error, StoreError};
use crate::shared::ids::RoleName;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    pub prompt_id: String,
    pub role_name: String,
    pub body: String,
    pub active: bool,
    pub created_at: String,
}

pub struct PromptRepository {
    db_path: PathBuf,
}

impl PromptRepository {
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
                CREATE TABLE IF NOT EXISTS role_prompts (
                    prompt_id TEXT PRIMARY KEY,
                    role_name TEXT NOT NULL,
                    body TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_role_prompts_one_active
                    ON role_prompts(role_name) WHERE active = 1;
                ",
            )
            .map_err(sql_error)
    }

    /// Inserts a new active prompt for the role, deactivating any previous
    /// active prompt in the same transaction.
    pub fn insert_prompt(
        &self,
        role_name: &RoleName,
        body: &str,
        now: &str,
    ) -> Result<PromptRecord, StoreError> {
        let record = PromptRecord {
            prompt_id: prompt_fingerprint(body),
            role_name: role_name.as_str().to_string(),
            body: body.to_string(),
            active: true,
            created_at: now.to_string(),
        };

        let mut connection = self.connect()?;
        let tx = connection.transaction().map_err(sql_error)?;
        tx.execute(
            "UPDATE role_prompts SET active = 0 WHERE role_name = ?1 AND active = 1",
            params![record.role_name],
        )
        .map_err(sql_error)?;
        tx.execute(
            "INSERT INTO role_prompts (prompt_id, role_name, body, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(prompt_id) DO UPDATE SET active = 1",
            params![
                record.prompt_id,
                record.role_name,
                record.body,
                record.active as i64,
                record.created_at,
            ],
        )
        .map_err(sql_error)?;
        tx.commit().map_err(sql_error)?;
        Ok(record)
    }

    pub fn active_prompt_for_role(
        &self,
        role_name: &str,
    ) -> Result<Option<PromptRecord>, StoreError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT prompt_id, role_name, body, active, created_at
                 FROM role_prompts WHERE role_name = ?1 AND active = 1",
                params![role_name],
                |row| {
                    Ok(PromptRecord {
                        prompt_id: row.get(0)?,
                        role_name: row.get(1)?,
                        body: row.get(2)?,
                        active: row.get::<_, i64>(3)? != 0,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(sql_error)
    }
}

/// Stable fingerprint id for a prompt body.
pub fn prompt_fingerprint(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("prompt-{}", &hex[..16])
}
