//! Batch evaluation of a prompt against multiple samples.
//!
//! Each sample is run through generate-then-judge; samples fan out in
//! parallel under a semaphore so at most `max_parallel` LLM calls are in
//! flight at once. Results are assembled in input order regardless of
//! completion order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cancel::CancellationFlag;
use crate::judge::{Judgment, MetricJudge};
use crate::sample::Sample;
use crate::score::{aggregate_metrics, mean, MetricScores};
use crate::trajectory::generator::{GenerationMode, TrajectoryGenerator};
use crate::trajectory::types::Trajectory;

/// Result of evaluating one sample within a batch.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    /// Position in the drawn batch.
    pub index: usize,
    /// Id of the evaluated sample.
    pub sample_id: String,
    /// The generated trajectory.
    pub trajectory: Trajectory,
    /// The judge's verdict.
    pub judgment: Judgment,
}

/// Aggregated result of evaluating a prompt on a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchEvaluation {
    /// Per-dimension means over samples where the dimension is present.
    pub metrics: MetricScores,
    /// Mean of per-sample overall scores; 0 for an empty batch.
    pub overall_score: f64,
    /// Per-sample outcomes in batch order.
    pub outcomes: Vec<SampleOutcome>,
}

impl BatchEvaluation {
    /// Per-sample feedback strings, in batch order. Failed samples
    /// contribute their failure marker.
    pub fn feedbacks(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| o.judgment.detailed_feedback.clone())
            .collect()
    }

    /// Per-sample improvement suggestions, in batch order.
    pub fn suggestions(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| o.judgment.suggested_improvements.clone())
            .collect()
    }

    /// Per-sample overall scores, in batch order.
    pub fn per_sample_overall(&self) -> Vec<f64> {
        self.outcomes
            .iter()
            .map(|o| o.judgment.overall_score)
            .collect()
    }
}

/// Evaluates prompts against sample batches.
pub struct BatchEvaluator {
    generator: TrajectoryGenerator,
    judge: MetricJudge,
    max_parallel: usize,
}

impl BatchEvaluator {
    pub fn new(generator: TrajectoryGenerator, judge: MetricJudge, max_parallel: usize) -> Self {
        Self {
            generator,
            judge,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Evaluates `prompt` against every sample in `batch`.
    ///
    /// Per-sample failures are folded into their outcomes; this method does
    /// not error. An empty batch yields score 0 and empty metrics.
    pub async fn evaluate(
        &self,
        batch: &[Sample],
        prompt: &str,
        mode: GenerationMode,
        cancel: &CancellationFlag,
    ) -> BatchEvaluation {
        if batch.is_empty() {
            return BatchEvaluation::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        let futures: Vec<_> = batch
            .iter()
            .enumerate()
            .map(|(index, sample)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    // Semaphore is function-local and never closed.
                    let _permit = semaphore.acquire().await.ok();

                    let trajectory = self.generator.generate(sample, prompt, mode).await;

                    // Cancellation checkpoint between generation and judging.
                    let judgment = if cancel.is_cancelled() {
                        Judgment::failed("cancelled")
                    } else {
                        self.judge.judge(sample, &trajectory).await
                    };

                    debug!(
                        index,
                        sample_id = %sample.id,
                        score = judgment.overall_score,
                        "Sample evaluated"
                    );

                    SampleOutcome {
                        index,
                        sample_id: sample.id.clone(),
                        trajectory,
                        judgment,
                    }
                }
            })
            .collect();

        // join_all preserves input order regardless of completion order.
        let outcomes = join_all(futures).await;

        let per_sample_metrics: Vec<MetricScores> = outcomes
            .iter()
            .map(|o| o.judgment.metrics.clone())
            .collect();
        let per_sample_overall: Vec<f64> =
            outcomes.iter().map(|o| o.judgment.overall_score).collect();

        BatchEvaluation {
            metrics: aggregate_metrics(&per_sample_metrics),
            overall_score: mean(&per_sample_overall),
            outcomes,
        }
    }
}
