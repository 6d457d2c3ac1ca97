pub mod anthropic;
pub mod invoker;
pub mod types;

pub use anthropic::AnthropicClient;
pub use invoker::ModelInvoker;
pub use types::{
    CompletionRequest, CompletionResponse, InvocationOutcome, ModelBackend, ProviderError,
    TokenCounts,
};
