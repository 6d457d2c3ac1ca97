use super::error::{sql_error, StoreError};
use crate::shared::ids::{PhaseName, RoleName};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseConfigRecord {
    pub phase_name: String,
    pub role_name: String,
    pub artifact_type: String,
    pub next_phase: Option<String>,
    pub active: bool,
    pub created_at: String,
}

pub struct PhaseConfigRepository {
    db_path: PathBuf,
}

impl PhaseConfigRepository {
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
                CREATE TABLE IF NOT EXISTS phase_configs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    phase_name TEXT NOT NULL,
                    role_name TEXT NOT NULL,
                    artifact_type TEXT NOT NULL,
                    next_phase TEXT,
                    active INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_phase_configs_one_active
                    ON phase_configs(phase_name) WHERE active = 1;

                CREATE TABLE IF NOT EXISTS roles (
                    role_name TEXT PRIMARY KEY,
                    active INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                ",
            )
            .map_err(sql_error)
    }

    /// Inserts a config row. When the row is active, any previously active
    /// row for the same phase is deactivated in the same transaction so the
    /// one-active-per-phase invariant holds.
    pub fn insert_phase_config(&self, record: &PhaseConfigRecord) -> Result<(), StoreError> {
        PhaseName::parse(&record.phase_name).map_err(StoreError::InvalidIdentifier)?;
        RoleName::parse(&record.role_name).map_err(StoreError::InvalidIdentifier)?;
        if let Some(next_phase) = &record.next_phase {
            PhaseName::parse(next_phase).map_err(StoreError::InvalidIdentifier)?;
        }

        let mut connection = self.connect()?;
        let tx = connection.transaction().map_err(sql_error)?;
        if record.active {
            tx.execute(
                "UPDATE phase_configs SET active = 0 WHERE phase_name = ?1 AND active = 1",
                params![record.phase_name],
            )
            .map_err(sql_error)?;
        }
        tx.execute(
            "INSERT INTO phase_configs
                (phase_name, role_name, artifact_type, next_phase, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.phase_name,
                record.role_name,
                record.artifact_type,
                record.next_phase,
                record.active as i64,
                record.created_at,
            ],
        )
        .map_err(sql_error)?;
        tx.commit().map_err(sql_error)
    }

    pub fn active_config(&self, phase_name: &str) -> Result<Option<PhaseConfigRecord>, StoreError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT phase_name, role_name, artifact_type, next_phase, active, created_at
                 FROM phase_configs WHERE phase_name = ?1 AND active = 1",
                params![phase_name],
                row_to_config,
            )
            .optional()
            .map_err(sql_error)
    }

    pub fn has_config(&self, phase_name: &str) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM phase_configs WHERE phase_name = ?1 LIMIT 1",
                params![phase_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        Ok(found.is_some())
    }

    pub fn all_active_configs(&self) -> Result<Vec<PhaseConfigRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT phase_name, role_name, artifact_type, next_phase, active, created_at
                 FROM phase_configs WHERE active = 1 ORDER BY phase_name ASC",
            )
            .map_err(sql_error)?;
        let rows = statement.query_map([], row_to_config).map_err(sql_error)?;

        let mut configs = Vec::new();
        for row in rows {
            configs.push(row.map_err(sql_error)?);
        }
        Ok(configs)
    }

    pub fn set_phase_active(&self, phase_name: &str, active: bool) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute(
                "UPDATE phase_configs SET active = ?2 WHERE phase_name = ?1",
                params![phase_name, active as i64],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    pub fn insert_role(&self, role_name: &RoleName, active: bool, now: &str) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO roles (role_name, active, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(role_name) DO UPDATE SET active = excluded.active",
                params![role_name.as_str(), active as i64, now],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    pub fn active_role_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT role_name FROM roles WHERE active = 1")
            .map_err(sql_error)?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_error)?;

        let mut names = BTreeSet::new();
        for row in rows {
            names.insert(row.map_err(sql_error)?);
        }
        Ok(names)
    }
}

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhaseConfigRecord> {
    Ok(PhaseConfigRecord {
        phase_name: row.get(0)?,
        role_name: row.get(1)?,
        artifact_type: row.get(2)?,
        next_phase: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}
