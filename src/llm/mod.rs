//! LLM provider integration.
//!
//! The [`ModelClient`] trait is the unified contract the optimizer depends
//! on: plain multi-step text generation (with optional tools), schema-bound
//! structured generation, and single-shot object generation for the judge.
//! [`LiteLlmClient`] is the shipped implementation against any
//! OpenAI-compatible endpoint.

pub mod client;
pub mod litellm;
pub mod schema;

pub use client::{
    ConfiguredTool, GenerationStep, ModelClient, ObjectRequest, StructuredRequest, TextRequest,
    TextResponse, ToolCallInfo, ToolDefinition, ToolHandler, ToolResultInfo,
};
pub use litellm::LiteLlmClient;
pub use schema::{FieldKind, FieldSpec, ObjectSchema};
