use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("model api request failed: {0}")]
    ApiRequest(String),
    #[error("model api returned an unusable response: {0}")]
    ApiResponse(String),
    #[error("model api key is not configured")]
    MissingApiKey,
}

/// One request against the model provider. System and user text are kept
/// separate because the provider treats them differently.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_text: String,
    pub user_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub token_counts: Option<TokenCounts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Seam between the invoker and a concrete provider transport.
pub trait ModelBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

/// Outcome of one model invocation. `success=false` carries the
/// stringified cause; elapsed time is measured on both paths.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub success: bool,
    pub raw_text: String,
    pub elapsed_ms: u64,
    pub token_counts: Option<TokenCounts>,
    pub error: Option<String>,
}
