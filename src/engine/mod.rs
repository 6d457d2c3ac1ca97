pub mod error;
pub mod executor;
pub mod legacy;
pub mod state_machine;

pub use error::{PhaseError, PipelineError};
pub use executor::{ExecutionResult, PhaseExecutor};
pub use state_machine::{AdvanceOutcome, PipelineStateMachine, StatusReport, ADVANCE_REASON};
