use super::ConfigError;
use crate::shared::ids::validate_identifier_value;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_entry_phase")]
    pub entry_phase: String,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub model: ModelSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default = "default_true")]
    pub data_driven: bool,
    #[serde(default = "default_max_phase_hops")]
    pub max_phase_hops: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            entry_phase: default_entry_phase(),
            engine: EngineSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_driven: true,
            max_phase_hops: default_max_phase_hops(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier_value("entry phase", &self.entry_phase)
            .map_err(ConfigError::Settings)?;
        if self.engine.max_phase_hops == 0 {
            return Err(ConfigError::Settings(
                "engine.max_phase_hops must be at least 1".to_string(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Settings(
                "model.max_tokens must be at least 1".to_string(),
            ));
        }
        if self.model.model_id.trim().is_empty() {
            return Err(ConfigError::Settings(
                "model.model_id must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads settings from a YAML file. A missing file yields the defaults; a
/// malformed file is an error.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Operator toggle between the config-driven engine and the legacy phase
/// sequence. Resolved once per advancement, never mid-execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    DataDriven,
    Legacy,
}

pub const ENGINE_MODE_ENV: &str = "PIPEWRIGHT_DATA_DRIVEN";

impl EngineMode {
    pub fn resolve(engine: &EngineSettings) -> Self {
        match std::env::var(ENGINE_MODE_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                if value.trim().eq_ignore_ascii_case("true") {
                    Self::DataDriven
                } else {
                    Self::Legacy
                }
            }
            _ => {
                if engine.data_driven {
                    Self::DataDriven
                } else {
                    Self::Legacy
                }
            }
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("pipewright.db")
}

fn default_entry_phase() -> String {
    "pm".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_phase_hops() -> u32 {
    20
}

fn default_model_id() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}
