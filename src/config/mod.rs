pub mod error;
pub mod settings;
pub mod store;

pub use error::ConfigError;
pub use settings::{
    load_settings, EngineMode, EngineSettings, ModelSettings, Settings, ENGINE_MODE_ENV,
};
pub use store::{
    ConfigStoreError, GraphReport, PhaseConfig, PhaseConfigStore, DEFAULT_MAX_PHASE_HOPS,
};
