//! Trajectory generation: executing a candidate prompt against a sample.
//!
//! Generation never fails outward. Any provider error, schema violation, or
//! timeout produces a trajectory whose final assistant turn is the
//! well-known error marker, so a flaky call surfaces as a low score rather
//! than an aborted iteration.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::llm::client::{
    ConfiguredTool, ModelClient, StructuredRequest, TextRequest, TextResponse,
};
use crate::message::{ChatMessage, ContentPart, Role};
use crate::sample::Sample;
use crate::trajectory::types::Trajectory;

/// Final assistant turn recorded when generation fails.
pub const GENERATION_ERROR_MARKER: &str = "[Error generating response]";

/// Generation mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Tool-enabled free-text generation.
    Text,
    /// Schema-bound structured generation.
    Structured,
}

/// Configuration for the trajectory generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Task-model identifier.
    pub model: String,
    /// Cap on assistant/tool cycles per trajectory.
    pub max_steps: u32,
    /// Tools exposed in text mode.
    pub tools: Vec<ConfiguredTool>,
    /// JSON schema used in structured mode.
    pub schema: Option<serde_json::Value>,
    /// Wall-clock timeout per generation call.
    pub call_timeout: Duration,
}

/// Executes candidate prompts against samples to produce trajectories.
pub struct TrajectoryGenerator {
    client: Arc<dyn ModelClient>,
    config: GeneratorConfig,
}

impl TrajectoryGenerator {
    pub fn new(client: Arc<dyn ModelClient>, config: GeneratorConfig) -> Self {
        Self { client, config }
    }

    /// Generates a trajectory for `sample` under `prompt`.
    ///
    /// The returned trajectory always contains the sample's user turns and
    /// at least one assistant turn. Failures yield the error-marker
    /// trajectory; this method does not error.
    pub async fn generate(
        &self,
        sample: &Sample,
        prompt: &str,
        mode: GenerationMode,
    ) -> Trajectory {
        let base = sample.user_messages();

        let result = match mode {
            GenerationMode::Text => self.generate_text(prompt, &base).await,
            GenerationMode::Structured => self.generate_structured(prompt, &base).await,
        };

        match result {
            Ok(mut generated) => {
                let mut messages = base;
                messages.append(&mut generated);
                Trajectory::new(messages)
            }
            Err(reason) => {
                warn!(sample_id = %sample.id, %reason, "Trajectory generation failed");
                let mut messages = base;
                messages.push(ChatMessage::assistant(GENERATION_ERROR_MARKER));
                Trajectory::new(messages)
            }
        }
    }

    /// Text mode: tool-enabled generation folded into typed message turns.
    async fn generate_text(
        &self,
        prompt: &str,
        base: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, String> {
        let request = TextRequest::new(&self.config.model, prompt, base.to_vec())
            .with_tools(self.config.tools.clone())
            .with_max_steps(self.config.max_steps);

        let response = tokio::time::timeout(self.config.call_timeout, self.client.text_generate(request))
            .await
            .map_err(|_| {
                format!(
                    "timed out after {} seconds",
                    self.config.call_timeout.as_secs()
                )
            })?
            .map_err(|e| e.to_string())?;

        let messages = fold_steps(&response);
        if messages.iter().any(|m| m.role == Role::Assistant) {
            Ok(messages)
        } else {
            Err("model produced no assistant output".to_string())
        }
    }

    /// Structured mode: one schema-bound call, recorded as a single
    /// assistant text part carrying the JSON serialization.
    async fn generate_structured(
        &self,
        prompt: &str,
        base: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, String> {
        let schema = self
            .config
            .schema
            .clone()
            .ok_or_else(|| "structured mode without a schema".to_string())?;

        let request = StructuredRequest::new(&self.config.model, prompt, base.to_vec(), schema);

        let object = tokio::time::timeout(
            self.config.call_timeout,
            self.client.structured_generate(request),
        )
        .await
        .map_err(|_| {
            format!(
                "timed out after {} seconds",
                self.config.call_timeout.as_secs()
            )
        })?
        .map_err(|e| e.to_string())?;

        let serialized = serde_json::to_string(&object).map_err(|e| e.to_string())?;
        Ok(vec![ChatMessage::with_parts(
            Role::Assistant,
            vec![ContentPart::Text { text: serialized }],
        )])
    }
}

/// Folds generation steps into message turns: a tool-call assistant turn
/// followed by one tool turn per result, then the final assistant text.
fn fold_steps(response: &TextResponse) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    for step in &response.steps {
        if !step.tool_calls.is_empty() {
            let mut call_parts: Vec<ContentPart> = Vec::with_capacity(step.tool_calls.len() + 1);
            if let Some(text) = &step.text {
                if !text.is_empty() {
                    call_parts.push(ContentPart::Text { text: text.clone() });
                }
            }
            call_parts.extend(step.tool_calls.iter().map(|call| ContentPart::ToolCall {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                args: call.args.clone(),
            }));
            messages.push(ChatMessage::with_parts(Role::Assistant, call_parts));

            for result in &step.tool_results {
                messages.push(ChatMessage::with_parts(
                    Role::Tool,
                    vec![ContentPart::ToolResult {
                        tool_call_id: result.tool_call_id.clone(),
                        tool_name: result.tool_name.clone(),
                        result: result.result.clone(),
                    }],
                ));
            }
        }

        if let Some(text) = &step.text {
            if step.tool_calls.is_empty() && !text.is_empty() {
                messages.push(ChatMessage::assistant(text.clone()));
            }
        }
    }

    // A response with steps but no final text turn still needs an assistant
    // turn for the judge to look at.
    let has_final_text = messages
        .iter()
        .any(|m| m.role == Role::Assistant && !m.text().is_empty());
    if !has_final_text && !response.text.is_empty() {
        messages.push(ChatMessage::assistant(response.text.clone()));
    }

    messages
}
