//! LiteLLM-compatible client implementation.
//!
//! Drives any OpenAI-compatible chat completions endpoint (LiteLLM proxy,
//! OpenRouter, a gateway) and implements the full [`ModelClient`] contract:
//! the tool loop for text generation, JSON-mode structured generation, and
//! single-shot object generation.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::client::{
    GenerationStep, ModelClient, ObjectRequest, StructuredRequest, TextRequest, TextResponse,
    ToolCallInfo, ToolResultInfo,
};
use crate::message::ChatMessage;
use crate::util::json_extraction::extract_json;

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "http://localhost:4000/v1")
    /// * `api_key` - Optional API key for authentication
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a new client from environment variables.
    ///
    /// Reads:
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        Ok(Self::new(api_base, api_key))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Issue one chat completion call and return the first choice message.
    async fn chat(
        &self,
        model: &str,
        messages: &[WireMessage],
        tools: Option<&[WireTool]>,
        response_format: Option<serde_json::Value>,
    ) -> Result<WireMessage, LlmError> {
        let request = WireRequest {
            model,
            messages,
            tools,
            response_format,
        };

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message: body,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(LlmError::EmptyResponse)
    }

    /// JSON-mode call that extracts and parses the returned object.
    async fn chat_json(
        &self,
        model: &str,
        messages: &[WireMessage],
    ) -> Result<serde_json::Value, LlmError> {
        let message = self
            .chat(
                model,
                messages,
                None,
                Some(serde_json::json!({"type": "json_object"})),
            )
            .await?;

        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let json_text = extract_json(&content)?;
        serde_json::from_str(&json_text).map_err(|e| LlmError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl ModelClient for LiteLlmClient {
    async fn text_generate(&self, request: TextRequest) -> Result<TextResponse, LlmError> {
        let mut wire_messages = Vec::with_capacity(request.messages.len() + 1);
        wire_messages.push(WireMessage::system(&request.system));
        wire_messages.extend(request.messages.iter().map(WireMessage::from_chat));

        let wire_tools: Option<Vec<WireTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(|t| WireTool::from(&t.definition)).collect())
        };

        let mut steps = Vec::new();
        let mut final_text = String::new();

        for cycle in 0..request.max_steps.max(1) {
            let message = self
                .chat(&request.model, &wire_messages, wire_tools.as_deref(), None)
                .await?;
            let text = message.content.clone().unwrap_or_default();

            let calls = message.tool_calls.clone().unwrap_or_default();
            if calls.is_empty() {
                final_text = text.clone();
                steps.push(GenerationStep::text(text));
                break;
            }

            debug!(cycle, tool_calls = calls.len(), "Model requested tools");
            wire_messages.push(message);

            let mut call_infos = Vec::with_capacity(calls.len());
            let mut result_infos = Vec::with_capacity(calls.len());
            for call in &calls {
                let args: serde_json::Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::Null);

                let result = match request
                    .tools
                    .iter()
                    .find(|t| t.definition.name == call.function.name)
                {
                    Some(tool) => match tool.handler.call(args.clone()).await {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(tool = %call.function.name, error = %e, "Tool call failed");
                            serde_json::json!({"error": e.to_string()})
                        }
                    },
                    None => {
                        warn!(tool = %call.function.name, "Model called an unknown tool");
                        serde_json::json!({"error": format!("unknown tool: {}", call.function.name)})
                    }
                };

                wire_messages.push(WireMessage::tool_result(&call.id, &result));

                call_infos.push(ToolCallInfo {
                    tool_call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    args,
                });
                result_infos.push(ToolResultInfo {
                    tool_call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    result,
                });
            }

            steps.push(GenerationStep {
                tool_calls: call_infos,
                tool_results: result_infos,
                text: if text.is_empty() { None } else { Some(text) },
            });
        }

        // Step cap reached mid tool loop: fall back to the last text seen.
        if final_text.is_empty() {
            final_text = steps
                .iter()
                .rev()
                .find_map(|step| step.text.clone())
                .unwrap_or_default();
        }

        Ok(TextResponse {
            steps,
            text: final_text,
        })
    }

    async fn structured_generate(
        &self,
        request: StructuredRequest,
    ) -> Result<serde_json::Value, LlmError> {
        let schema_text = serde_json::to_string_pretty(&request.schema)
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let system = format!(
            "{}\n\nRespond with a single JSON object conforming to this JSON schema:\n{}\nOutput only the JSON object, no other text.",
            request.system, schema_text
        );

        let mut wire_messages = Vec::with_capacity(request.messages.len() + 1);
        wire_messages.push(WireMessage::system(&system));
        wire_messages.extend(request.messages.iter().map(WireMessage::from_chat));

        self.chat_json(&request.model, &wire_messages).await
    }

    async fn object_generate(&self, request: ObjectRequest) -> Result<serde_json::Value, LlmError> {
        let wire_messages = vec![
            WireMessage::system(&request.schema.to_instruction()),
            WireMessage::user(&request.prompt),
        ];

        self.chat_json(&request.model, &wire_messages).await
    }
}

// ============================================================================
// Wire types (OpenAI-compatible chat completions)
// ============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [WireTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, result: &serde_json::Value) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }

    fn from_chat(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: Some(message.text()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&crate::llm::client::ToolDefinition> for WireTool {
    fn from(definition: &crate::llm::client::ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: WireFunctionDef {
                name: definition.name.clone(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_requires_api_base() {
        // Both branches in one test: env vars are process-global.
        env::remove_var("LITELLM_API_BASE");
        assert!(matches!(
            LiteLlmClient::from_env(),
            Err(LlmError::MissingApiBase)
        ));

        env::set_var("LITELLM_API_BASE", "http://localhost:4000/v1");
        let client = LiteLlmClient::from_env().expect("should build from env");
        assert_eq!(client.api_base(), "http://localhost:4000/v1");
        env::remove_var("LITELLM_API_BASE");
    }

    #[test]
    fn test_explicit_construction() {
        let client = LiteLlmClient::new("http://localhost:4000/v1", Some("key".to_string()));
        assert_eq!(client.api_base(), "http://localhost:4000/v1");
        assert!(client.has_api_key());

        let anonymous = LiteLlmClient::new("http://localhost:4000/v1", None);
        assert!(!anonymous.has_api_key());
    }

    #[test]
    fn test_wire_request_serialization() {
        let messages = vec![WireMessage::system("sys"), WireMessage::user("hi")];
        let request = WireRequest {
            model: "test-model",
            messages: &messages,
            tools: None,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        };

        let json = serde_json::to_value(&request).expect("serialization should work");
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_wire_response_parsing() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"q\": \"x\"}"}
                    }]
                }
            }]
        }"#;

        let parsed: WireResponse = serde_json::from_str(body).expect("should parse");
        let message = &parsed.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].function.name, "search");
    }
}
