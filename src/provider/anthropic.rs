use super::types::{
    CompletionRequest, CompletionResponse, ModelBackend, ProviderError, TokenCounts,
};
use serde::{Deserialize, Serialize};

const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        let api_base = std::env::var("ANTHROPIC_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_BASE.to_string());
        Self { api_base, api_key }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ProviderError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }
}

impl ModelBackend for AnthropicClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = MessagesRequest {
            model: &request.model_id,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system_text,
            messages: vec![MessageParam {
                role: "user",
                content: &request.user_text,
            }],
        };

        let response = ureq::post(&self.endpoint("v1/messages"))
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .send_json(
                serde_json::to_value(&body)
                    .map_err(|e| ProviderError::ApiRequest(e.to_string()))?,
            )
            .map_err(|e| ProviderError::ApiRequest(e.to_string()))?;

        let parsed: MessagesResponse = response
            .into_json()
            .map_err(|e| ProviderError::ApiRequest(e.to_string()))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(ProviderError::ApiResponse(
                "response carried no text content".to_string(),
            ));
        }

        Ok(CompletionResponse {
            text,
            token_counts: parsed.usage.map(|usage| TokenCounts {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        })
    }
}
