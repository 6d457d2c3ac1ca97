#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("json column `{column}` failed to decode: {source}")]
    JsonColumn {
        column: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid pipeline status `{value}` in database")]
    InvalidStatus { value: String },
    #[error("identifier validation failed: {0}")]
    InvalidIdentifier(String),
}

pub(crate) fn sql_error(source: rusqlite::Error) -> StoreError {
    StoreError::Sql { source }
}

pub(crate) fn json_column_error(column: &str, source: serde_json::Error) -> StoreError {
    StoreError::JsonColumn {
        column: column.to_string(),
        source,
    }
}
