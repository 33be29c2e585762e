//! Reflective prompt rewriting.
//!
//! The rewriter bundles per-sample judge feedback and suggestions, then asks
//! the reflection model for an improved prompt. Errors propagate to the
//! loop, which emits `reflection_failed` and re-evaluates the unchanged
//! parent prompt so the strict acceptance test rejects it.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::LlmError;
use crate::llm::client::{ModelClient, TextRequest};
use crate::message::ChatMessage;

/// Delimiter between per-sample feedback entries in the meta-prompt.
pub const FEEDBACK_DELIMITER: &str = "\n\n---\n\n";

const REFLECTION_SYSTEM_PROMPT: &str = "You are an expert prompt engineer. You will be shown a \
system prompt, evaluator feedback from running it against several conversation samples, and \
suggested improvements. Rewrite the prompt so it addresses the most critical issues across the \
samples while preserving what already works. Return ONLY the improved prompt text, with no \
preamble, commentary, or formatting around it.";

/// Produces improved prompts from aggregated judge feedback.
pub struct ReflectionRewriter {
    client: Arc<dyn ModelClient>,
    model: String,
    call_timeout: Duration,
}

impl ReflectionRewriter {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            call_timeout,
        }
    }

    /// Rewrites `current_prompt` using the batch's feedback and suggestions.
    ///
    /// Returns the trimmed improved prompt. Errors (provider failure,
    /// timeout, empty reply) are returned to the caller.
    pub async fn rewrite(
        &self,
        current_prompt: &str,
        feedbacks: &[String],
        suggestions: &[String],
    ) -> Result<String, LlmError> {
        let feedback_bundle = feedbacks.join(FEEDBACK_DELIMITER);
        let suggestion_bundle = suggestions.join(FEEDBACK_DELIMITER);

        let user_message = format!(
            "Current system prompt:\n{current_prompt}\n\n\
             Evaluator feedback (one entry per sample):\n{feedback_bundle}\n\n\
             Suggested improvements (one entry per sample):\n{suggestion_bundle}\n\n\
             Write the improved system prompt now."
        );

        let request = TextRequest::new(
            &self.model,
            REFLECTION_SYSTEM_PROMPT,
            vec![ChatMessage::user(user_message)],
        );

        let response = tokio::time::timeout(self.call_timeout, self.client.text_generate(request))
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.call_timeout.as_secs(),
            })??;

        let improved = response.text.trim().to_string();
        if improved.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        debug!(chars = improved.len(), "Reflection produced a rewritten prompt");
        Ok(improved)
    }
}
