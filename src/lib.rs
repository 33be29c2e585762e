//! prompt-forge: evolutionary prompt optimization with LLM-as-judge scoring.
//!
//! Given a seed system prompt, a corpus of labeled conversation samples, a
//! task model that executes prompts, and a reflection model that judges and
//! rewrites them, the optimizer iteratively evolves the prompt: each
//! iteration evaluates a parent candidate on a sample batch, rewrites it
//! from the judge's feedback, re-evaluates on the same batch, and accepts
//! the rewrite only on strict improvement. A per-sample Pareto frontier
//! tracks the best candidates across scoring dimensions, and every step
//! streams progress events to an injected sink.

// Core modules
pub mod cancel;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod judge;
pub mod llm;
pub mod message;
pub mod optimizer;
pub mod pareto;
pub mod reflection;
pub mod sample;
pub mod score;
pub mod trajectory;
pub mod util;

// Re-export the run-facing surface
pub use cancel::CancellationFlag;
pub use config::{DimensionConfig, OptimizeRequest, OptimizerConfig, SelectorKind};
pub use error::{LlmError, OptimizeError};
pub use optimizer::{EventSink, MemorySink, OptimizeEvent, OptimizeOutcome, Optimizer};
pub use pareto::PromptCandidate;
pub use sample::{Feedback, FeedbackRating, Sample};
