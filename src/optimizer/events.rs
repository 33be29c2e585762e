//! Progress events emitted during an optimization run.
//!
//! Events are plain serializable objects delivered to an injected sink in
//! emission order. Transport (SSE framing, persistence) is a host concern:
//! each event serializes to a single JSON object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::pareto::PromptCandidate;
use crate::score::MetricScores;

/// Reason attached to a fatal `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    NoSamples,
    MissingSchema,
    InvalidConfig,
}

/// A progress event within an optimization run.
///
/// Every variant carries the iteration it belongs to (0 for seed/start) and
/// a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizeEvent {
    Start {
        iteration: u32,
        message: String,
        num_rollouts: u32,
        sample_count: usize,
    },
    SeedEvaluated {
        iteration: u32,
        message: String,
        score: f64,
        metrics: MetricScores,
    },
    IterationStart {
        iteration: u32,
        message: String,
        parent_id: String,
    },
    SampleGenerated {
        iteration: u32,
        message: String,
        sample_index: usize,
        sample_id: String,
    },
    SampleJudged {
        iteration: u32,
        message: String,
        sample_index: usize,
        sample_id: String,
        score: f64,
        metrics: MetricScores,
    },
    IterationAccepted {
        iteration: u32,
        message: String,
        batch_score: f64,
        improved_score: f64,
        best_score: f64,
        metrics: MetricScores,
        candidate_prompt: String,
    },
    IterationRejected {
        iteration: u32,
        message: String,
        batch_score: f64,
        improved_score: f64,
    },
    IterationError {
        iteration: u32,
        message: String,
    },
    ReflectionFailed {
        iteration: u32,
        message: String,
    },
    Complete {
        iteration: u32,
        message: String,
        final_prompt: String,
        best_score: f64,
        collection_size: usize,
        candidates: Vec<PromptCandidate>,
        elapsed_ms: u64,
    },
    Error {
        iteration: u32,
        message: String,
        reason: ErrorReason,
    },
}

impl OptimizeEvent {
    /// The event's kind tag, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizeEvent::Start { .. } => "start",
            OptimizeEvent::SeedEvaluated { .. } => "seed_evaluated",
            OptimizeEvent::IterationStart { .. } => "iteration_start",
            OptimizeEvent::SampleGenerated { .. } => "sample_generated",
            OptimizeEvent::SampleJudged { .. } => "sample_judged",
            OptimizeEvent::IterationAccepted { .. } => "iteration_accepted",
            OptimizeEvent::IterationRejected { .. } => "iteration_rejected",
            OptimizeEvent::IterationError { .. } => "iteration_error",
            OptimizeEvent::ReflectionFailed { .. } => "reflection_failed",
            OptimizeEvent::Complete { .. } => "complete",
            OptimizeEvent::Error { .. } => "error",
        }
    }

    /// The iteration the event belongs to.
    pub fn iteration(&self) -> u32 {
        match self {
            OptimizeEvent::Start { iteration, .. }
            | OptimizeEvent::SeedEvaluated { iteration, .. }
            | OptimizeEvent::IterationStart { iteration, .. }
            | OptimizeEvent::SampleGenerated { iteration, .. }
            | OptimizeEvent::SampleJudged { iteration, .. }
            | OptimizeEvent::IterationAccepted { iteration, .. }
            | OptimizeEvent::IterationRejected { iteration, .. }
            | OptimizeEvent::IterationError { iteration, .. }
            | OptimizeEvent::ReflectionFailed { iteration, .. }
            | OptimizeEvent::Complete { iteration, .. }
            | OptimizeEvent::Error { iteration, .. } => *iteration,
        }
    }
}

/// Receives progress events in emission order.
///
/// The loop awaits each `emit` before producing the next event, so sinks
/// observe the documented ordering without any buffering of their own.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: OptimizeEvent);
}

/// Sink that records every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<OptimizeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub async fn events(&self) -> Vec<OptimizeEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, event: OptimizeEvent) {
        self.events.lock().await.push(event);
    }
}

/// Sink that forwards events to an unbounded channel.
///
/// Useful when a host streams events to a transport task. Send failures
/// (receiver dropped) are ignored: a disappearing consumer must not abort
/// the run.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OptimizeEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<OptimizeEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: OptimizeEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tagged() {
        let event = OptimizeEvent::IterationAccepted {
            iteration: 2,
            message: "accepted".to_string(),
            batch_score: 0.4,
            improved_score: 0.6,
            best_score: 0.6,
            metrics: MetricScores::new(),
            candidate_prompt: "new prompt".to_string(),
        };

        let json = serde_json::to_value(&event).expect("serialization should work");
        assert_eq!(json["type"], "iteration_accepted");
        assert_eq!(json["iteration"], 2);
        assert_eq!(json["improved_score"], 0.6);
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let event = OptimizeEvent::Error {
            iteration: 0,
            message: "no samples".to_string(),
            reason: ErrorReason::NoSamples,
        };
        let json = serde_json::to_value(&event).expect("serialization should work");
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["reason"], "no_samples");
    }

    #[tokio::test]
    async fn test_memory_sink_preserves_order() {
        let sink = MemorySink::new();
        for iteration in 0..3 {
            sink.emit(OptimizeEvent::IterationStart {
                iteration,
                message: format!("iteration {iteration}"),
                parent_id: "seed".to_string(),
            })
            .await;
        }

        let events = sink.events().await;
        assert_eq!(events.len(), 3);
        let iterations: Vec<u32> = events.iter().map(|e| e.iteration()).collect();
        assert_eq!(iterations, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_survives_drop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.emit(OptimizeEvent::Start {
            iteration: 0,
            message: "go".to_string(),
            num_rollouts: 5,
            sample_count: 3,
        })
        .await;
        let received = rx.recv().await.expect("event forwarded");
        assert_eq!(received.kind(), "start");

        drop(rx);
        // Must not panic once the receiver is gone.
        sink.emit(OptimizeEvent::IterationStart {
            iteration: 1,
            message: "still going".to_string(),
            parent_id: "seed".to_string(),
        })
        .await;
    }
}
