//! The optimization loop.
//!
//! One [`Optimizer::run`] call owns one run: it validates configuration,
//! evaluates the seed prompt, then iterates select → evaluate → rewrite →
//! re-evaluate → accept. Only configuration errors are fatal; everything
//! else degrades locally and the loop keeps going.

use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::OptimizerConfig;
use crate::error::OptimizeError;
use crate::evaluator::{BatchEvaluation, BatchEvaluator};
use crate::judge::{JudgeConfig, MetricJudge};
use crate::llm::client::ModelClient;
use crate::optimizer::events::{ErrorReason, EventSink, OptimizeEvent};
use crate::pareto::{select_parent, ParetoFrontier, PromptCandidate, SEED_CANDIDATE_ID};
use crate::reflection::ReflectionRewriter;
use crate::sample::{admit_samples, Sample};
use crate::trajectory::generator::{GenerationMode, GeneratorConfig, TrajectoryGenerator};

/// Final result of an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOutcome {
    /// Prompt of the best candidate.
    pub best_prompt: String,
    /// Best overall score observed.
    pub best_score: f64,
    /// Id of the best candidate.
    pub best_candidate_id: String,
    /// Every candidate recorded, in insertion order (seed first).
    pub candidates: Vec<PromptCandidate>,
    /// Append-only record of every event emitted.
    pub event_log: Vec<OptimizeEvent>,
}

/// Mutable state owned by the loop for the duration of one run.
struct RunState {
    candidates: Vec<PromptCandidate>,
    frontier: ParetoFrontier,
    best_overall: f64,
    best_candidate_id: String,
    event_log: Vec<OptimizeEvent>,
}

impl RunState {
    fn new(num_samples: usize) -> Self {
        Self {
            candidates: Vec::new(),
            frontier: ParetoFrontier::new(num_samples),
            best_overall: 0.0,
            best_candidate_id: SEED_CANDIDATE_ID.to_string(),
            event_log: Vec::new(),
        }
    }

    /// Appends to the event log and forwards to the sink, in that order.
    async fn emit(&mut self, sink: &dyn EventSink, event: OptimizeEvent) {
        self.event_log.push(event.clone());
        sink.emit(event).await;
    }
}

/// Runs the evolutionary prompt optimization algorithm.
pub struct Optimizer {
    task_client: Arc<dyn ModelClient>,
    reflection_client: Arc<dyn ModelClient>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(
        task_client: Arc<dyn ModelClient>,
        reflection_client: Arc<dyn ModelClient>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            task_client,
            reflection_client,
            config,
        }
    }

    /// Runs one optimization from `seed_prompt` over `samples`.
    ///
    /// Fatal configuration errors emit an `error` event and return `Err`;
    /// every other failure degrades locally and the run completes with
    /// whatever best it found.
    pub async fn run(
        &self,
        samples: Vec<Sample>,
        seed_prompt: impl Into<String>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationFlag,
    ) -> Result<OptimizeOutcome, OptimizeError> {
        let started = Instant::now();
        let seed_prompt = seed_prompt.into();

        if let Err(e) = self.config.validate() {
            let reason = match &e {
                OptimizeError::MissingSchema => ErrorReason::MissingSchema,
                _ => ErrorReason::InvalidConfig,
            };
            error!(error = %e, "Optimization rejected: invalid configuration");
            sink.emit(OptimizeEvent::Error {
                iteration: 0,
                message: e.to_string(),
                reason,
            })
            .await;
            return Err(e);
        }

        let samples = admit_samples(samples);
        if samples.is_empty() {
            let e = OptimizeError::NoSamples;
            error!("Optimization rejected: no usable samples");
            sink.emit(OptimizeEvent::Error {
                iteration: 0,
                message: e.to_string(),
                reason: ErrorReason::NoSamples,
            })
            .await;
            return Err(e);
        }

        let dimensions = self.config.active_dimensions();
        let dimension_names: Vec<String> = dimensions.keys().cloned().collect();
        let mode = if self.config.request.use_structured_output {
            GenerationMode::Structured
        } else {
            GenerationMode::Text
        };

        let generator = TrajectoryGenerator::new(
            Arc::clone(&self.task_client),
            GeneratorConfig {
                model: self.config.request.optimization_model.clone(),
                max_steps: self.config.max_steps,
                tools: self.config.tools.clone(),
                schema: self.config.schema.clone(),
                call_timeout: self.config.call_timeout,
            },
        );
        let judge = MetricJudge::new(
            Arc::clone(&self.reflection_client),
            JudgeConfig {
                model: self.config.request.reflection_model.clone(),
                dimensions: dimensions.clone(),
                prompts: self.config.judge_prompts.clone(),
                call_timeout: self.config.call_timeout,
            },
        );
        let evaluator = BatchEvaluator::new(generator, judge, self.config.max_parallel);
        let rewriter = ReflectionRewriter::new(
            Arc::clone(&self.reflection_client),
            self.config.request.reflection_model.clone(),
            self.config.call_timeout,
        );

        let mut rng = match self.config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        let num_rollouts = self.config.request.num_rollouts;
        let mut state = RunState::new(samples.len());

        info!(
            num_rollouts,
            sample_count = samples.len(),
            model = %self.config.request.optimization_model,
            "Starting prompt optimization"
        );
        state
            .emit(
                &*sink,
                OptimizeEvent::Start {
                    iteration: 0,
                    message: format!(
                        "Starting optimization: {} rollouts over {} samples",
                        num_rollouts,
                        samples.len()
                    ),
                    num_rollouts,
                    sample_count: samples.len(),
                },
            )
            .await;

        // Seed evaluation.
        let (batch_indices, batch) = self.draw_batch(&samples, &mut rng);
        let seed_eval = evaluator.evaluate(&batch, &seed_prompt, mode, &cancel).await;
        emit_sample_events(&mut state, &*sink, 0, &seed_eval).await;

        let seed_candidate =
            PromptCandidate::seed(&seed_prompt, seed_eval.metrics.clone(), seed_eval.overall_score);
        state.frontier.observe(
            SEED_CANDIDATE_ID,
            &paired_scores(&batch_indices, &seed_eval),
        );
        state
            .frontier
            .update_frontier(&seed_candidate, &dimension_names);
        state.best_overall = seed_eval.overall_score;
        state.candidates.push(seed_candidate);

        state
            .emit(
                &*sink,
                OptimizeEvent::SeedEvaluated {
                    iteration: 0,
                    message: format!("Seed prompt scored {:.3}", seed_eval.overall_score),
                    score: seed_eval.overall_score,
                    metrics: seed_eval.metrics.clone(),
                },
            )
            .await;

        // Iterations.
        for iteration in 1..=num_rollouts {
            if cancel.is_cancelled() {
                info!(iteration, "Cancellation requested, stopping before iteration");
                break;
            }

            let result = self
                .run_iteration(
                    iteration,
                    &samples,
                    &dimension_names,
                    mode,
                    &evaluator,
                    &rewriter,
                    &mut rng,
                    &mut state,
                    &*sink,
                    &cancel,
                )
                .await;

            if let Err(e) = result {
                error!(iteration, error = %e, "Iteration failed");
                state
                    .emit(
                        &*sink,
                        OptimizeEvent::IterationError {
                            iteration,
                            message: format!("Iteration {iteration} failed: {e}"),
                        },
                    )
                    .await;
            }
        }

        // Termination.
        let best = state
            .candidates
            .iter()
            .find(|c| c.id == state.best_candidate_id)
            .or_else(|| state.candidates.first())
            .cloned()
            .unwrap_or_else(|| {
                PromptCandidate::seed(seed_prompt.clone(), Default::default(), 0.0)
            });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let best_overall = state.best_overall;
        info!(
            best_score = best_overall,
            best_candidate = %best.id,
            collection_size = state.candidates.len(),
            elapsed_ms,
            "Optimization complete"
        );
        let candidates_snapshot = state.candidates.clone();
        let complete = OptimizeEvent::Complete {
            iteration: num_rollouts,
            message: format!(
                "Optimization complete: best score {:.3} from '{}'",
                best_overall, best.id
            ),
            final_prompt: best.prompt.clone(),
            best_score: best_overall,
            collection_size: candidates_snapshot.len(),
            candidates: candidates_snapshot,
            elapsed_ms,
        };
        state.emit(&*sink, complete).await;

        Ok(OptimizeOutcome {
            best_prompt: best.prompt,
            best_score: state.best_overall,
            best_candidate_id: state.best_candidate_id,
            candidates: state.candidates,
            event_log: state.event_log,
        })
    }

    /// One select → evaluate → rewrite → re-evaluate → accept cycle.
    #[allow(clippy::too_many_arguments)]
    async fn run_iteration(
        &self,
        iteration: u32,
        samples: &[Sample],
        dimension_names: &[String],
        mode: GenerationMode,
        evaluator: &BatchEvaluator,
        rewriter: &ReflectionRewriter,
        rng: &mut ChaCha8Rng,
        state: &mut RunState,
        sink: &dyn EventSink,
        cancel: &CancellationFlag,
    ) -> Result<(), OptimizeError> {
        let (parent_id, parent_prompt) = {
            let parent = select_parent(
                self.config.selector,
                &state.candidates,
                &state.frontier,
                rng,
            );
            (parent.id.clone(), parent.prompt.clone())
        };

        debug!(iteration, parent = %parent_id, "Iteration starting");
        state
            .emit(
                sink,
                OptimizeEvent::IterationStart {
                    iteration,
                    message: format!("Iteration {iteration}: evolving from '{parent_id}'"),
                    parent_id: parent_id.clone(),
                },
            )
            .await;

        let (batch_indices, batch) = self.draw_batch(samples, rng);

        let parent_eval = evaluator.evaluate(&batch, &parent_prompt, mode, cancel).await;
        emit_sample_events(state, sink, iteration, &parent_eval).await;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let improved_prompt = match rewriter
            .rewrite(
                &parent_prompt,
                &parent_eval.feedbacks(),
                &parent_eval.suggestions(),
            )
            .await
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(iteration, error = %e, "Reflection failed, keeping parent prompt");
                state
                    .emit(
                        sink,
                        OptimizeEvent::ReflectionFailed {
                            iteration,
                            message: format!("Reflection failed: {e}"),
                        },
                    )
                    .await;
                parent_prompt.clone()
            }
        };

        // Improved prompt is scored on the SAME batch as the parent.
        let improved_eval = evaluator.evaluate(&batch, &improved_prompt, mode, cancel).await;
        emit_sample_events(state, sink, iteration, &improved_eval).await;
        if cancel.is_cancelled() {
            return Ok(());
        }

        // Strict improvement only: equal scores are rejected so neutral
        // rewrites under judge nondeterminism cannot drift the prompt.
        if improved_eval.overall_score > parent_eval.overall_score {
            let candidate = PromptCandidate {
                id: format!("candidate-{iteration}"),
                prompt: improved_prompt.clone(),
                metrics: improved_eval.metrics.clone(),
                overall_score: improved_eval.overall_score,
                parents: vec![parent_id],
                discovered_at_iteration: iteration,
            };

            state
                .frontier
                .observe(&candidate.id, &paired_scores(&batch_indices, &improved_eval));
            state.frontier.update_frontier(&candidate, dimension_names);

            if improved_eval.overall_score > state.best_overall {
                state.best_overall = improved_eval.overall_score;
                state.best_candidate_id = candidate.id.clone();
            }

            info!(
                iteration,
                batch_score = parent_eval.overall_score,
                improved_score = improved_eval.overall_score,
                "Candidate accepted"
            );
            let event = OptimizeEvent::IterationAccepted {
                iteration,
                message: format!(
                    "Iteration {iteration} accepted: {:.3} -> {:.3}",
                    parent_eval.overall_score, improved_eval.overall_score
                ),
                batch_score: parent_eval.overall_score,
                improved_score: improved_eval.overall_score,
                best_score: state.best_overall,
                metrics: improved_eval.metrics.clone(),
                candidate_prompt: improved_prompt,
            };
            state.candidates.push(candidate);
            state.emit(sink, event).await;
        } else {
            debug!(
                iteration,
                batch_score = parent_eval.overall_score,
                improved_score = improved_eval.overall_score,
                "Candidate rejected"
            );
            state
                .emit(
                    sink,
                    OptimizeEvent::IterationRejected {
                        iteration,
                        message: format!(
                            "Iteration {iteration} rejected: {:.3} did not beat {:.3}",
                            improved_eval.overall_score, parent_eval.overall_score
                        ),
                        batch_score: parent_eval.overall_score,
                        improved_score: improved_eval.overall_score,
                    },
                )
                .await;
        }

        Ok(())
    }

    /// Draws a batch of `batch_size` samples, returning validation-set
    /// indices alongside the cloned samples.
    fn draw_batch(&self, samples: &[Sample], rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<Sample>) {
        let batch_size = self.config.request.batch_size;

        let indices: Vec<usize> = if self.config.sample_without_replacement {
            let mut all: Vec<usize> = (0..samples.len()).collect();
            all.shuffle(rng);
            all.truncate(batch_size.min(samples.len()));
            all
        } else {
            (0..batch_size)
                .map(|_| rng.random_range(0..samples.len()))
                .collect()
        };

        let batch = indices.iter().map(|&i| samples[i].clone()).collect();
        (indices, batch)
    }
}

/// Pairs validation-set indices with the evaluation's per-sample overalls.
fn paired_scores(indices: &[usize], eval: &BatchEvaluation) -> Vec<(usize, f64)> {
    indices
        .iter()
        .copied()
        .zip(eval.per_sample_overall())
        .collect()
}

/// Streams per-sample progress for an assembled batch, in batch order.
async fn emit_sample_events(
    state: &mut RunState,
    sink: &dyn EventSink,
    iteration: u32,
    eval: &BatchEvaluation,
) {
    for outcome in &eval.outcomes {
        state
            .emit(
                sink,
                OptimizeEvent::SampleGenerated {
                    iteration,
                    message: format!("Generated trajectory for sample '{}'", outcome.sample_id),
                    sample_index: outcome.index,
                    sample_id: outcome.sample_id.clone(),
                },
            )
            .await;
        state
            .emit(
                sink,
                OptimizeEvent::SampleJudged {
                    iteration,
                    message: format!(
                        "Sample '{}' judged at {:.3}",
                        outcome.sample_id, outcome.judgment.overall_score
                    ),
                    sample_index: outcome.index,
                    sample_id: outcome.sample_id.clone(),
                    score: outcome.judgment.overall_score,
                    metrics: outcome.judgment.metrics.clone(),
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizeRequest;

    // Loop behavior is exercised end to end in tests/optimizer_scenarios.rs;
    // here only the batch-drawing helper is covered.

    struct NoopClient;

    #[async_trait::async_trait]
    impl ModelClient for NoopClient {
        async fn text_generate(
            &self,
            _request: crate::llm::client::TextRequest,
        ) -> Result<crate::llm::client::TextResponse, crate::error::LlmError> {
            Ok(Default::default())
        }

        async fn structured_generate(
            &self,
            _request: crate::llm::client::StructuredRequest,
        ) -> Result<serde_json::Value, crate::error::LlmError> {
            Ok(serde_json::Value::Null)
        }

        async fn object_generate(
            &self,
            _request: crate::llm::client::ObjectRequest,
        ) -> Result<serde_json::Value, crate::error::LlmError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn optimizer(config: OptimizerConfig) -> Optimizer {
        Optimizer::new(Arc::new(NoopClient), Arc::new(NoopClient), config)
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                Sample::new(
                    format!("s{i}"),
                    vec![crate::message::ChatMessage::user(format!("question {i}"))],
                )
            })
            .collect()
    }

    #[test]
    fn test_draw_batch_with_replacement() {
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_batch_size(8),
        )
        .with_rng_seed(42);
        let optimizer = optimizer(config);

        let samples = samples(3);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (indices, batch) = optimizer.draw_batch(&samples, &mut rng);

        // With replacement: the batch can exceed the sample count.
        assert_eq!(indices.len(), 8);
        assert_eq!(batch.len(), 8);
        assert!(indices.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_draw_batch_without_replacement() {
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_batch_size(8),
        )
        .with_sample_without_replacement(true);
        let optimizer = optimizer(config);

        let samples = samples(3);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (indices, _batch) = optimizer.draw_batch(&samples, &mut rng);

        // Without replacement: capped at the sample count, all distinct.
        assert_eq!(indices.len(), 3);
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_draw_batch_deterministic_with_seed() {
        let config = OptimizerConfig::new(
            OptimizeRequest::new("task", "reflect").with_batch_size(4),
        );
        let optimizer = optimizer(config);
        let samples = samples(5);

        let mut rng_a = ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = ChaCha8Rng::seed_from_u64(7);
        let (indices_a, _) = optimizer.draw_batch(&samples, &mut rng_a);
        let (indices_b, _) = optimizer.draw_batch(&samples, &mut rng_b);

        assert_eq!(indices_a, indices_b);
    }
}
