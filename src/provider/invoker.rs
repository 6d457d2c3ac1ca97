use super::types::{CompletionRequest, InvocationOutcome, ModelBackend};
use std::time::Instant;
use tracing::{debug, warn};

/// Thin wrapper around a single model call. `invoke` never fails: provider
/// faults become a failed outcome with the stringified cause. No retry
/// lives here.
pub struct ModelInvoker {
    backend: Box<dyn ModelBackend>,
}

impl ModelInvoker {
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn invoke(&self, request: &CompletionRequest) -> InvocationOutcome {
        let started = Instant::now();
        match self.backend.complete(request) {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(
                    model_id = %request.model_id,
                    elapsed_ms,
                    "model invocation succeeded"
                );
                InvocationOutcome {
                    success: true,
                    raw_text: response.text,
                    elapsed_ms,
                    token_counts: response.token_counts,
                    error: None,
                }
            }
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    model_id = %request.model_id,
                    elapsed_ms,
                    error = %err,
                    "model invocation failed"
                );
                InvocationOutcome {
                    success: false,
                    raw_text: String::new(),
                    elapsed_ms,
                    token_counts: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
