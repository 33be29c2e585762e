//! LLM-as-judge scoring of generated trajectories.
//!
//! The judge compares a generated trajectory against the sample's recorded
//! conversation across the active dimensions, using a structured-output call
//! whose schema requires one numeric field per dimension plus textual
//! feedback. A judge failure never aborts a batch: it scores 0 with a
//! marker feedback string.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{DimensionConfig, JudgePromptConfig};
use crate::llm::client::{ModelClient, ObjectRequest};
use crate::llm::schema::{FieldSpec, ObjectSchema};
use crate::message::render_messages;
use crate::sample::Sample;
use crate::score::{clamp_unit, weighted_overall, MetricScores};
use crate::trajectory::types::Trajectory;

/// Field name for the judge's narrative feedback.
pub const DETAILED_FEEDBACK_FIELD: &str = "detailed_feedback";
/// Field name for the judge's prompt-improvement suggestions.
pub const SUGGESTED_IMPROVEMENTS_FIELD: &str = "suggested_improvements";

/// Result of judging one (sample, trajectory) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Per-dimension scores in `[0, 1]`; empty on judge failure.
    pub metrics: MetricScores,
    /// Weighted mean over the present dimensions.
    pub overall_score: f64,
    /// Narrative assessment of the generated response.
    pub detailed_feedback: String,
    /// Concrete suggestions for improving the prompt.
    pub suggested_improvements: String,
}

impl Judgment {
    /// The judgment recorded when the structured call fails.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            metrics: MetricScores::new(),
            overall_score: 0.0,
            detailed_feedback: format!("[judge failed: {reason}]"),
            suggested_improvements: String::new(),
        }
    }
}

/// Configuration for the metric judge.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Reflection-model identifier used for judging.
    pub model: String,
    /// Active dimensions to score on.
    pub dimensions: BTreeMap<String, DimensionConfig>,
    /// Polarity and comparison phrasing.
    pub prompts: JudgePromptConfig,
    /// Wall-clock timeout per judge call.
    pub call_timeout: Duration,
}

/// Scores generated trajectories against their samples.
pub struct MetricJudge {
    client: Arc<dyn ModelClient>,
    config: JudgeConfig,
}

impl MetricJudge {
    pub fn new(client: Arc<dyn ModelClient>, config: JudgeConfig) -> Self {
        Self { client, config }
    }

    /// The active dimensions this judge scores on.
    pub fn dimensions(&self) -> &BTreeMap<String, DimensionConfig> {
        &self.config.dimensions
    }

    /// Judges one (sample, generated trajectory) pair.
    ///
    /// Never errors: any structured-output failure yields
    /// [`Judgment::failed`] with empty metrics and score 0.
    pub async fn judge(&self, sample: &Sample, generated: &Trajectory) -> Judgment {
        let request = ObjectRequest::new(
            &self.config.model,
            self.build_schema(),
            self.build_prompt(sample, generated),
        );

        let call = self.client.object_generate(request);
        let value = match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(sample_id = %sample.id, error = %e, "Judge call failed");
                return Judgment::failed(e);
            }
            Err(_) => {
                let seconds = self.config.call_timeout.as_secs();
                warn!(sample_id = %sample.id, seconds, "Judge call timed out");
                return Judgment::failed(format!("timed out after {seconds} seconds"));
            }
        };

        self.parse(&value)
    }

    /// Structured-output schema: one `[0,1]` number per dimension plus the
    /// two feedback fields.
    fn build_schema(&self) -> ObjectSchema {
        let mut schema = ObjectSchema::new(
            "trajectory_judgment",
            "Per-dimension quality scores for a generated assistant response",
        );
        for (name, dimension) in &self.config.dimensions {
            schema = schema.with_field(FieldSpec::dimension(name, &dimension.description));
        }
        schema
            .with_field(FieldSpec::text(
                DETAILED_FEEDBACK_FIELD,
                "Specific assessment of what the generated response did well or poorly",
            ))
            .with_field(FieldSpec::text(
                SUGGESTED_IMPROVEMENTS_FIELD,
                "Concrete changes to the system prompt that would improve the response",
            ))
    }

    /// Assembles the judge prompt: dimension table, polarity instructions,
    /// and both message histories rendered verbatim.
    fn build_prompt(&self, sample: &Sample, generated: &Trajectory) -> String {
        let mut dimension_lines = Vec::with_capacity(self.config.dimensions.len());
        for (name, dimension) in &self.config.dimensions {
            dimension_lines.push(format!(
                "- {} (weight {}): {}",
                name, dimension.weight, dimension.description
            ));
        }

        let (polarity, comparison) = if sample.is_positive() {
            (
                self.config.prompts.positive_feedback_instruction.as_str(),
                self.config.prompts.comparison_positive.as_str(),
            )
        } else {
            (
                self.config.prompts.negative_feedback_instruction.as_str(),
                self.config.prompts.comparison_negative.as_str(),
            )
        };

        let comment = sample
            .feedback
            .as_ref()
            .and_then(|f| f.comment.as_deref())
            .map(|comment| format!("\nHuman feedback comment: {comment}\n"))
            .unwrap_or_default();

        format!(
            "You are an expert evaluator scoring a generated assistant response against a \
             reference conversation.\n\n\
             Score the generated response on each dimension, from 0.0 to 1.0:\n{dimensions}\n\n\
             {polarity}\n{comparison}\n{comment}\n\
             Reference conversation:\n{reference}\n\n\
             Generated conversation:\n{generated}",
            dimensions = dimension_lines.join("\n"),
            reference = render_messages(&sample.messages),
            generated = render_messages(&generated.messages),
        )
    }

    /// Extracts and clamps dimension scores from the returned object.
    fn parse(&self, value: &serde_json::Value) -> Judgment {
        let mut metrics = MetricScores::new();
        for name in self.config.dimensions.keys() {
            if let Some(raw) = value.get(name).and_then(|v| v.as_f64()) {
                metrics.insert(name.clone(), clamp_unit(raw));
            }
        }

        let overall_score = weighted_overall(&metrics, &self.config.dimensions);

        let detailed_feedback = value
            .get(DETAILED_FEEDBACK_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let suggested_improvements = value
            .get(SUGGESTED_IMPROVEMENTS_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Judgment {
            metrics,
            overall_score,
            detailed_feedback,
            suggested_improvements,
        }
    }
}
