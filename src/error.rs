//! Error types for prompt optimization runs.
//!
//! Two error families exist:
//! - [`OptimizeError`]: fatal configuration errors that terminate a run
//!   before any iteration.
//! - [`LlmError`]: provider-level failures (transport, parsing, timeouts).
//!   These never terminate a run; components degrade per their local
//!   failure semantics.

use thiserror::Error;

/// Fatal errors for an optimization run.
///
/// Everything else (generator, judge, reflection, per-iteration failures)
/// is recovered in place and surfaces through the event stream.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("No usable samples: every sample was missing or lacked a user turn")]
    NoSamples,

    #[error("Structured output requested but no JSON schema was supplied")]
    MissingSchema,

    #[error("Invalid dimension '{name}': {reason}")]
    InvalidDimension { name: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during LLM provider operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Response did not satisfy the requested schema: {0}")]
    SchemaViolation(String),

    #[error("Tool '{name}' failed: {reason}")]
    ToolFailed { name: String, reason: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured timeout here; callers
            // that know the duration attach it themselves.
            LlmError::Timeout { seconds: 0 }
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
