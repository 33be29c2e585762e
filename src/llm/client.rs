//! Unified model client contract.
//!
//! Task models and reflection models are injected behind [`ModelClient`],
//! so the optimizer never couples to a concrete provider. All three
//! operations are suspension points; callers enforce wall-clock timeouts.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::schema::ObjectSchema;
use crate::message::ChatMessage;

/// Declarative description of a tool exposed to the task model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name as presented to the model.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Executes a tool call on behalf of the host.
///
/// Tool behavior is a host concern; the optimizer only records the completed
/// call/result pairs the client hands back.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, LlmError>;
}

/// A tool definition paired with its host-side handler.
#[derive(Clone)]
pub struct ConfiguredTool {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl ConfiguredTool {
    pub fn new(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

impl std::fmt::Debug for ConfiguredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// A tool invocation emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// The completed result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultInfo {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: serde_json::Value,
}

/// One assistant/tool cycle of a text generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStep {
    /// Tool calls the model emitted in this cycle.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallInfo>,
    /// Results of those calls, in call order.
    #[serde(default)]
    pub tool_results: Vec<ToolResultInfo>,
    /// Assistant text emitted in this cycle, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl GenerationStep {
    /// A step carrying only final assistant text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            text: Some(text.into()),
        }
    }
}

/// Request for multi-step text generation.
#[derive(Debug, Clone)]
pub struct TextRequest {
    /// Model identifier passed through to the provider.
    pub model: String,
    /// System prompt for the generation.
    pub system: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Tools exposed to the model; empty for plain generation.
    pub tools: Vec<ConfiguredTool>,
    /// Cap on assistant/tool cycles.
    pub max_steps: u32,
}

impl TextRequest {
    pub fn new(
        model: impl Into<String>,
        system: impl Into<String>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages,
            tools: Vec::new(),
            max_steps: 1,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ConfiguredTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Response from a text generation: the recorded cycles plus final text.
#[derive(Debug, Clone, Default)]
pub struct TextResponse {
    pub steps: Vec<GenerationStep>,
    pub text: String,
}

/// Request for schema-bound structured generation.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// JSON schema the output object must satisfy.
    pub schema: serde_json::Value,
}

impl StructuredRequest {
    pub fn new(
        model: impl Into<String>,
        system: impl Into<String>,
        messages: Vec<ChatMessage>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages,
            schema,
        }
    }
}

/// Request for single-shot object generation against a field schema.
///
/// Used by the judge: the schema enumerates required numeric and text
/// fields; implementations map it onto their provider's structured-output
/// feature.
#[derive(Debug, Clone)]
pub struct ObjectRequest {
    pub model: String,
    pub schema: ObjectSchema,
    pub prompt: String,
}

impl ObjectRequest {
    pub fn new(model: impl Into<String>, schema: ObjectSchema, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            schema,
            prompt: prompt.into(),
        }
    }
}

/// Unified contract for task and reflection models.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Multi-step text generation with optional tool use.
    async fn text_generate(&self, request: TextRequest) -> Result<TextResponse, LlmError>;

    /// Generation constrained to a supplied JSON schema.
    async fn structured_generate(
        &self,
        request: StructuredRequest,
    ) -> Result<serde_json::Value, LlmError>;

    /// Single-shot object generation against a field schema.
    async fn object_generate(&self, request: ObjectRequest) -> Result<serde_json::Value, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_request_builder() {
        let request = TextRequest::new("gpt-test", "be helpful", vec![ChatMessage::user("hi")])
            .with_max_steps(5);

        assert_eq!(request.model, "gpt-test");
        assert_eq!(request.system, "be helpful");
        assert_eq!(request.max_steps, 5);
        assert!(request.tools.is_empty());
    }

    #[test]
    fn test_generation_step_text() {
        let step = GenerationStep::text("done");
        assert!(step.tool_calls.is_empty());
        assert!(step.tool_results.is_empty());
        assert_eq!(step.text.as_deref(), Some("done"));
    }

    #[test]
    fn test_tool_definition_serialization() {
        let tool = ToolDefinition::new(
            "search",
            "Search the web",
            serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        );
        let json = serde_json::to_string(&tool).expect("serialization should work");
        assert!(json.contains("search"));
        assert!(json.contains("properties"));
    }
}
