use crate::persistence::{PhaseConfigRecord, PhaseConfigRepository, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::error;

pub const DEFAULT_MAX_PHASE_HOPS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("phase config not found: {phase_name}")]
    NotFound { phase_name: String },
    #[error("phase config not active: {phase_name}")]
    Inactive { phase_name: String },
    #[error("failed to load configuration: {source}")]
    Storage {
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseConfig {
    pub phase_name: String,
    pub role_name: String,
    pub artifact_type: String,
    pub next_phase: Option<String>,
}

impl From<PhaseConfigRecord> for PhaseConfig {
    fn from(record: PhaseConfigRecord) -> Self {
        Self {
            phase_name: record.phase_name,
            role_name: record.role_name,
            artifact_type: record.artifact_type,
            next_phase: record.next_phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphReport {
    pub valid: bool,
    pub problems: Vec<String>,
}

/// Loads one phase's configuration and validates the whole phase graph.
pub struct PhaseConfigStore {
    configs: PhaseConfigRepository,
    max_phase_hops: u32,
}

impl PhaseConfigStore {
    pub fn new(configs: PhaseConfigRepository) -> Self {
        Self {
            configs,
            max_phase_hops: DEFAULT_MAX_PHASE_HOPS,
        }
    }

    pub fn with_max_phase_hops(mut self, max_phase_hops: u32) -> Self {
        self.max_phase_hops = max_phase_hops;
        self
    }

    /// Loads the active config for a phase. Not-found and inactive are
    /// logged at error severity, phase name included, before the error is
    /// returned.
    pub fn load(&self, phase_name: &str) -> Result<PhaseConfig, ConfigStoreError> {
        let active = self
            .configs
            .active_config(phase_name)
            .map_err(|source| ConfigStoreError::Storage { source })?;
        if let Some(record) = active {
            return Ok(record.into());
        }

        let has_rows = self
            .configs
            .has_config(phase_name)
            .map_err(|source| ConfigStoreError::Storage { source })?;
        if has_rows {
            error!(phase_name, "phase config not active");
            Err(ConfigStoreError::Inactive {
                phase_name: phase_name.to_string(),
            })
        } else {
            error!(phase_name, "phase config not found");
            Err(ConfigStoreError::NotFound {
                phase_name: phase_name.to_string(),
            })
        }
    }

    /// Walks the whole active phase graph and returns every violation
    /// found: unresolved role references, dangling `next_phase` pointers,
    /// and chains that revisit a phase or exceed the hop ceiling. A direct
    /// self-loop is reported as a one-hop cycle.
    pub fn validate_graph(&self) -> Result<GraphReport, ConfigStoreError> {
        let configs = self
            .configs
            .all_active_configs()
            .map_err(|source| ConfigStoreError::Storage { source })?;
        let active_roles = self
            .configs
            .active_role_names()
            .map_err(|source| ConfigStoreError::Storage { source })?;

        let by_name: BTreeMap<&str, &PhaseConfigRecord> = configs
            .iter()
            .map(|config| (config.phase_name.as_str(), config))
            .collect();

        let mut problems = Vec::new();
        for config in &configs {
            if !active_roles.contains(&config.role_name) {
                problems.push(format!(
                    "phase `{}` references unknown or inactive role `{}`",
                    config.phase_name, config.role_name
                ));
            }
            if let Some(next_phase) = &config.next_phase {
                if !by_name.contains_key(next_phase.as_str()) {
                    problems.push(format!(
                        "phase `{}` points at unknown next phase `{}`",
                        config.phase_name, next_phase
                    ));
                }
            }
            self.walk_chain(config, &by_name, &mut problems);
        }

        Ok(GraphReport {
            valid: problems.is_empty(),
            problems,
        })
    }

    fn walk_chain(
        &self,
        start: &PhaseConfigRecord,
        by_name: &BTreeMap<&str, &PhaseConfigRecord>,
        problems: &mut Vec<String>,
    ) {
        let mut visited = BTreeSet::new();
        visited.insert(start.phase_name.clone());
        let mut current = start.next_phase.clone();
        let mut hops = 0_u32;

        while let Some(next_name) = current {
            hops += 1;
            if hops > self.max_phase_hops {
                problems.push(format!(
                    "phase chain starting at `{}` exceeds the {}-hop ceiling",
                    start.phase_name, self.max_phase_hops
                ));
                return;
            }
            if !visited.insert(next_name.clone()) {
                problems.push(format!(
                    "phase chain starting at `{}` revisits `{}` after {} hop(s)",
                    start.phase_name, next_name, hops
                ));
                return;
            }
            // Dangling pointers end the walk; they are reported separately.
            current = by_name
                .get(next_name.as_str())
                .and_then(|config| config.next_phase.clone());
        }
    }
}
