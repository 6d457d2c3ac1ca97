pub mod error;
pub mod phase_configs;
pub mod pipelines;
pub mod prompts;
pub mod usage;

pub use error::StoreError;
pub use phase_configs::{PhaseConfigRecord, PhaseConfigRepository};
pub use pipelines::{PipelineRecord, PipelineRepository, PipelineStatus, TransitionRecord};
pub use prompts::{prompt_fingerprint, PromptRecord, PromptRepository};
pub use usage::{UsageRecord, UsageRepository};
