//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing `/chat/completions` and
//! `/embeddings` in the same shape (OpenRouter, Ollama, vLLM, ...).
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Embeddings for knowledge-base retrieval
//! - A per-request API key override (agents may carry their own key)

use agentexec_core::error::ProviderError;
use agentexec_core::message::{Message, MessageToolCall, Role};
use agentexec_core::provider::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// `api_key` may be absent when every request carries its own key.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", Some(api_key.into()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The key for one call: the request override wins over the configured key.
    fn resolve_key(&self, request_key: Option<&str>) -> Result<String, ProviderError> {
        request_key
            .filter(|k| !k.is_empty())
            .or(self.api_key.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Provider '{}' has no API key configured",
                    self.name
                ))
            })
    }

    /// POST a JSON body and map transport and status failures.
    async fn post_json(
        &self,
        path: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn parse_completion(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message = Message::assistant(choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls);

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
        })
    }
}

#[async_trait]
impl agentexec_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let api_key = self.resolve_key(request.api_key.as_deref())?;
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self.post_json("chat/completions", &api_key, &body).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_completion(api_response)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let api_key = self.resolve_key(None)?;

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post_json("embeddings", &api_key, &body).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        Ok(EmbeddingResponse {
            embeddings: api_resp.data.into_iter().map(|d| d.embedding).collect(),
            model: api_resp.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let api_key = self.resolve_key(None)?;
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentexec_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("local", "http://localhost:8000/v1/", None);
        assert_eq!(provider.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn request_key_overrides_configured_key() {
        let provider = OpenAiCompatProvider::openai("sk-config");
        assert_eq!(provider.resolve_key(Some("sk-agent")).unwrap(), "sk-agent");
        assert_eq!(provider.resolve_key(Some("")).unwrap(), "sk-config");
        assert_eq!(provider.resolve_key(None).unwrap(), "sk-config");
    }

    #[test]
    fn missing_key_is_not_configured() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.openai.com/v1", None);
        assert!(matches!(
            provider.resolve_key(None),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant("").with_tool_calls(vec![MessageToolCall {
            id: "call_1".into(),
            name: "gmail".into(),
            arguments: r#"{"action":"search"}"#.into(),
        }]);
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "gmail");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_omits_empty_tools() {
        let request = ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: Some(1000),
            tools: vec![],
            api_key: None,
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["max_tokens"], 1000);
        assert!(body.get("tools").is_none());

        let request = ProviderRequest {
            tools: vec![ToolDefinition {
                name: "csv".into(),
                description: "Read and write CSV files".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..request
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["tools"][0]["function"]["name"], "csv");
    }

    #[test]
    fn parse_tool_call_response() {
        let data = r#"{
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"id": "call_9", "type": "function",
                    "function": {"name": "json", "arguments": "{\"action\":\"read\"}"}}]}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let api: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::parse_completion(api).unwrap();
        assert_eq!(response.model, "gpt-4o-mini-2024");
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.tool_calls[0].name, "json");
        assert_eq!(response.usage.unwrap().total_tokens, 16);
    }

    #[test]
    fn parse_response_without_choices_fails() {
        let api: ApiResponse =
            serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::parse_completion(api).is_err());
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].embedding, vec![0.4, 0.5, 0.6]);
        assert_eq!(parsed.model, "text-embedding-3-small");
    }
}
