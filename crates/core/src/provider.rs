//! Provider trait: the abstraction over the language-model endpoint.
//!
//! A Provider takes a message list plus tool schemas and returns either a
//! final assistant message or one or more tool-call requests.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Overrides the provider's configured API key for this request.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message; non-empty `tool_calls` means a tool request.
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    pub model: String,
}

/// The core Provider trait.
///
/// The reasoning loop calls `complete()` without knowing which backend
/// serves the model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_never_serialized() {
        let req = ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![],
            temperature: default_temperature(),
            max_tokens: Some(1000),
            tools: vec![],
            api_key: Some("sk-secret".into()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("gpt-4o-mini"));
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "gmail".into(),
            description: "Send and read email".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "action": { "type": "string" } },
                "required": ["action"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("gmail"));
        assert!(json.contains("action"));
    }
}
