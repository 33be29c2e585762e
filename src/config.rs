//! Configuration for optimization runs.
//!
//! An [`OptimizeRequest`] is the host-facing request DTO; [`OptimizerConfig`]
//! adds the host-configured dimension table, tools, schema, and tuning knobs.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OptimizeError;
use crate::llm::client::ConfiguredTool;

/// Name of the built-in fallback dimension.
pub const BUILTIN_ACCURACY: &str = "accuracy";

/// Configuration of one scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// What this dimension measures, shown to the judge.
    pub description: String,
    /// Non-negative aggregation weight.
    pub weight: f64,
}

impl DimensionConfig {
    pub fn new(description: impl Into<String>, weight: f64) -> Self {
        Self {
            description: description.into(),
            weight,
        }
    }
}

/// Parent-selection strategy for the optimization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// Highest overall score among all candidates.
    #[default]
    CurrentBest,
    /// Uniform draw from the union of per-sample best candidate sets.
    Pareto,
}

/// Configurable judge phrasing for feedback polarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgePromptConfig {
    /// How to treat a positively-rated reference conversation.
    pub positive_feedback_instruction: String,
    /// How to treat a negatively-rated reference conversation.
    pub negative_feedback_instruction: String,
    /// Comparison guidance under positive polarity.
    pub comparison_positive: String,
    /// Comparison guidance under negative polarity.
    pub comparison_negative: String,
}

impl Default for JudgePromptConfig {
    fn default() -> Self {
        Self {
            positive_feedback_instruction: "The reference conversation was rated positively by a \
                human. Treat its assistant turns as the standard the generated response should \
                match."
                .to_string(),
            negative_feedback_instruction: "The reference conversation was rated negatively by a \
                human. Treat its assistant turns as an anti-example the generated response should \
                improve upon."
                .to_string(),
            comparison_positive: "Score highly when the generated response matches the reference \
                in meaning, completeness, and tool usage."
                .to_string(),
            comparison_negative: "Score highly when the generated response avoids the reference's \
                mistakes while still addressing the user's request."
                .to_string(),
        }
    }
}

/// Host-facing optimization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// Model identifier passed to the task-model client.
    pub optimization_model: String,
    /// Model identifier passed to the judge and rewriter.
    pub reflection_model: String,
    /// Samples drawn per iteration batch.
    pub batch_size: usize,
    /// Iterations after the seed evaluation.
    pub num_rollouts: u32,
    /// Subset of configured dimensions to score on; empty falls back to
    /// the built-in `accuracy` dimension.
    #[serde(default)]
    pub selected_metrics: Vec<String>,
    /// Whether the generator uses the structured-output path.
    #[serde(default)]
    pub use_structured_output: bool,
}

impl Default for OptimizeRequest {
    fn default() -> Self {
        Self {
            optimization_model: String::new(),
            reflection_model: String::new(),
            batch_size: 3,
            num_rollouts: 10,
            selected_metrics: Vec::new(),
            use_structured_output: false,
        }
    }
}

impl OptimizeRequest {
    /// Create a request with default knobs for the given models.
    pub fn new(optimization_model: impl Into<String>, reflection_model: impl Into<String>) -> Self {
        Self {
            optimization_model: optimization_model.into(),
            reflection_model: reflection_model.into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_num_rollouts(mut self, num_rollouts: u32) -> Self {
        self.num_rollouts = num_rollouts;
        self
    }

    pub fn with_selected_metrics(mut self, metrics: Vec<String>) -> Self {
        self.selected_metrics = metrics;
        self
    }

    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.use_structured_output = enabled;
        self
    }
}

/// Full configuration for one optimization run.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Host-facing request knobs.
    pub request: OptimizeRequest,
    /// Configured dimension table (name -> description, weight).
    pub dimensions: BTreeMap<String, DimensionConfig>,
    /// JSON schema for structured-output generation; required iff
    /// `request.use_structured_output`.
    pub schema: Option<serde_json::Value>,
    /// Tools exposed to the task model in text mode.
    pub tools: Vec<ConfiguredTool>,
    /// Intra-batch fan-out cap across task and reflection calls.
    pub max_parallel: usize,
    /// Per-trajectory assistant/tool cycle cap.
    pub max_steps: u32,
    /// Parent selection strategy.
    pub selector: SelectorKind,
    /// Wall-clock timeout applied to every LLM call.
    pub call_timeout: Duration,
    /// Draw iteration batches without replacement instead of with.
    pub sample_without_replacement: bool,
    /// Seed for batch sampling and the pareto selector; None seeds from
    /// entropy.
    pub rng_seed: Option<u64>,
    /// Judge phrasing.
    pub judge_prompts: JudgePromptConfig,
}

impl OptimizerConfig {
    /// Create a configuration with default knobs.
    pub fn new(request: OptimizeRequest) -> Self {
        Self {
            request,
            dimensions: BTreeMap::new(),
            schema: None,
            tools: Vec::new(),
            max_parallel: 4,
            max_steps: 5,
            selector: SelectorKind::default(),
            call_timeout: Duration::from_secs(60),
            sample_without_replacement: false,
            rng_seed: None,
            judge_prompts: JudgePromptConfig::default(),
        }
    }

    pub fn with_dimensions(mut self, dimensions: BTreeMap<String, DimensionConfig>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ConfiguredTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_selector(mut self, selector: SelectorKind) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_sample_without_replacement(mut self, without_replacement: bool) -> Self {
        self.sample_without_replacement = without_replacement;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_judge_prompts(mut self, prompts: JudgePromptConfig) -> Self {
        self.judge_prompts = prompts;
        self
    }

    /// Validates the fatal-error preconditions of a run.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.request.batch_size < 1 {
            return Err(OptimizeError::InvalidRequest(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.request.use_structured_output && self.schema.is_none() {
            return Err(OptimizeError::MissingSchema);
        }
        for (name, dimension) in &self.dimensions {
            if !dimension.weight.is_finite() || dimension.weight < 0.0 {
                return Err(OptimizeError::InvalidDimension {
                    name: name.clone(),
                    reason: format!("weight must be finite and >= 0, got {}", dimension.weight),
                });
            }
        }
        Ok(())
    }

    /// The dimensions this run scores on.
    ///
    /// Intersection of `selected_metrics` and the configured table; when
    /// that intersection is empty the built-in `accuracy` dimension (weight
    /// 1) is used.
    pub fn active_dimensions(&self) -> BTreeMap<String, DimensionConfig> {
        let active: BTreeMap<String, DimensionConfig> = if self.request.selected_metrics.is_empty()
        {
            BTreeMap::new()
        } else {
            self.request
                .selected_metrics
                .iter()
                .filter_map(|name| {
                    self.dimensions
                        .get(name)
                        .map(|config| (name.clone(), config.clone()))
                })
                .collect()
        };

        if active.is_empty() {
            let mut fallback = BTreeMap::new();
            fallback.insert(
                BUILTIN_ACCURACY.to_string(),
                DimensionConfig::new(
                    "How accurately the response addresses the user's request",
                    1.0,
                ),
            );
            fallback
        } else {
            active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> OptimizerConfig {
        OptimizerConfig::new(OptimizeRequest::new("task-model", "reflect-model"))
    }

    #[test]
    fn test_request_defaults() {
        let request = OptimizeRequest::default();
        assert_eq!(request.batch_size, 3);
        assert_eq!(request.num_rollouts, 10);
        assert!(request.selected_metrics.is_empty());
        assert!(!request.use_structured_output);
    }

    #[test]
    fn test_config_defaults() {
        let config = base_config();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.selector, SelectorKind::CurrentBest);
        assert_eq!(config.call_timeout, Duration::from_secs(60));
        assert!(!config.sample_without_replacement);
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn test_validate_batch_size() {
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_batch_size(0),
        );
        assert!(matches!(
            config.validate(),
            Err(OptimizeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_structured_needs_schema() {
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_structured_output(true),
        );
        assert!(matches!(
            config.validate(),
            Err(OptimizeError::MissingSchema)
        ));

        let with_schema = config.with_schema(serde_json::json!({"type": "object"}));
        assert!(with_schema.validate().is_ok());
    }

    #[test]
    fn test_validate_dimension_weights() {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("tone".to_string(), DimensionConfig::new("tone", -1.0));
        let config = base_config().with_dimensions(dimensions);
        assert!(matches!(
            config.validate(),
            Err(OptimizeError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_active_dimensions_intersection() {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("tone".to_string(), DimensionConfig::new("tone", 1.0));
        dimensions.insert("accuracy".to_string(), DimensionConfig::new("accuracy", 2.0));

        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_selected_metrics(vec![
                "tone".to_string(),
                "unknown".to_string(),
            ]),
        )
        .with_dimensions(dimensions);

        let active = config.active_dimensions();
        assert_eq!(active.len(), 1);
        assert!(active.contains_key("tone"));
    }

    #[test]
    fn test_active_dimensions_fallback() {
        // No selection and no configuration: built-in accuracy.
        let active = base_config().active_dimensions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[BUILTIN_ACCURACY].weight, 1.0);

        // Selection that misses the configured table entirely.
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect")
                .with_selected_metrics(vec!["missing".to_string()]),
        );
        let active = config.active_dimensions();
        assert!(active.contains_key(BUILTIN_ACCURACY));
    }
}
