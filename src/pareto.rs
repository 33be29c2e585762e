//! Prompt candidates, Pareto frontier maintenance, and parent selection.
//!
//! The frontier tracks two things across a run: the best overall score seen
//! per validation sample (with the set of candidates tied at that best), and
//! the set of candidates not dominated by any other under the active
//! dimensions.

use std::collections::BTreeSet;

use rand::seq::IndexedRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::SelectorKind;
use crate::score::MetricScores;

/// Candidate id reserved for the seed prompt.
pub const SEED_CANDIDATE_ID: &str = "seed";

/// A prompt text plus its scores and provenance within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptCandidate {
    /// Opaque id, unique within the run; the seed is labeled `seed`.
    pub id: String,
    /// The prompt text.
    pub prompt: String,
    /// Batch-aggregated dimension scores at discovery time.
    pub metrics: MetricScores,
    /// Batch overall score at discovery time.
    pub overall_score: f64,
    /// Ids of the candidates this one was derived from.
    pub parents: Vec<String>,
    /// Iteration at which this candidate was discovered (0 for the seed).
    pub discovered_at_iteration: u32,
}

impl PromptCandidate {
    /// The seed candidate, recorded at iteration 0 with no parents.
    pub fn seed(prompt: impl Into<String>, metrics: MetricScores, overall_score: f64) -> Self {
        Self {
            id: SEED_CANDIDATE_ID.to_string(),
            prompt: prompt.into(),
            metrics,
            overall_score,
            parents: Vec::new(),
            discovered_at_iteration: 0,
        }
    }
}

/// Whether `a` dominates `b` over the given dimensions: `a >= b` everywhere
/// with strict inequality somewhere. A dimension missing from a candidate's
/// metrics counts as 0.
pub fn dominates(a: &MetricScores, b: &MetricScores, dimensions: &[String]) -> bool {
    if dimensions.is_empty() {
        return false;
    }

    let mut strictly_better = false;
    for dimension in dimensions {
        let a_value = a.get(dimension).copied().unwrap_or(0.0);
        let b_value = b.get(dimension).copied().unwrap_or(0.0);
        if a_value < b_value {
            return false;
        }
        if a_value > b_value {
            strictly_better = true;
        }
    }
    strictly_better
}

/// A frontier member: candidate id plus its metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrontierEntry {
    id: String,
    metrics: MetricScores,
}

/// Per-sample best tracking plus the non-dominated candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoFrontier {
    /// Highest overall score observed per validation sample.
    best: Vec<Option<f64>>,
    /// Candidate ids tied at each sample's best.
    best_candidates: Vec<BTreeSet<String>>,
    /// Non-dominated candidates under the active dimensions.
    entries: Vec<FrontierEntry>,
}

impl ParetoFrontier {
    /// Creates a frontier for a validation set of `num_samples` samples.
    pub fn new(num_samples: usize) -> Self {
        Self {
            best: vec![None; num_samples],
            best_candidates: vec![BTreeSet::new(); num_samples],
            entries: Vec::new(),
        }
    }

    /// Records per-sample overall scores for a fully evaluated candidate.
    ///
    /// `scores` pairs validation-sample indices with the candidate's overall
    /// score on that sample. Per-sample bests never decrease; ties extend
    /// the tied-candidate set.
    pub fn observe(&mut self, candidate_id: &str, scores: &[(usize, f64)]) {
        for &(sample_index, score) in scores {
            if sample_index >= self.best.len() {
                continue;
            }
            match self.best[sample_index] {
                Some(best) if score < best => {}
                Some(best) if score == best => {
                    self.best_candidates[sample_index].insert(candidate_id.to_string());
                }
                _ => {
                    self.best[sample_index] = Some(score);
                    self.best_candidates[sample_index].clear();
                    self.best_candidates[sample_index].insert(candidate_id.to_string());
                }
            }
        }
    }

    /// Inserts a candidate into the non-dominated set.
    ///
    /// Existing members dominated by the newcomer are removed; the newcomer
    /// is admitted iff no remaining member dominates it.
    pub fn update_frontier(&mut self, candidate: &PromptCandidate, dimensions: &[String]) {
        self.entries
            .retain(|entry| !dominates(&candidate.metrics, &entry.metrics, dimensions));

        let is_dominated = self
            .entries
            .iter()
            .any(|entry| dominates(&entry.metrics, &candidate.metrics, dimensions));

        if !is_dominated {
            self.entries.push(FrontierEntry {
                id: candidate.id.clone(),
                metrics: candidate.metrics.clone(),
            });
        }
    }

    /// Ids of the current frontier members, in insertion order.
    pub fn frontier_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    /// Number of frontier members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best overall score observed for a sample, if any candidate has been
    /// observed on it.
    pub fn best(&self, sample_index: usize) -> Option<f64> {
        self.best.get(sample_index).copied().flatten()
    }

    /// Candidates tied at a sample's best score.
    pub fn best_candidates(&self, sample_index: usize) -> Option<&BTreeSet<String>> {
        self.best_candidates.get(sample_index)
    }

    /// Union of all per-sample best candidate sets.
    pub fn pareto_pool(&self) -> BTreeSet<&str> {
        self.best_candidates
            .iter()
            .flat_map(|set| set.iter().map(|id| id.as_str()))
            .collect()
    }
}

/// Selects the parent candidate for the next iteration.
///
/// `candidates` must be non-empty (the seed is always present once the run
/// has started).
pub fn select_parent<'a>(
    kind: SelectorKind,
    candidates: &'a [PromptCandidate],
    frontier: &ParetoFrontier,
    rng: &mut ChaCha8Rng,
) -> &'a PromptCandidate {
    match kind {
        SelectorKind::CurrentBest => current_best(candidates),
        SelectorKind::Pareto => {
            let pool = frontier.pareto_pool();
            let eligible: Vec<&PromptCandidate> = candidates
                .iter()
                .filter(|candidate| pool.contains(candidate.id.as_str()))
                .collect();
            match eligible.choose(rng) {
                Some(candidate) => *candidate,
                None => current_best(candidates),
            }
        }
    }
}

/// Highest overall score; earliest discovery wins ties.
fn current_best(candidates: &[PromptCandidate]) -> &PromptCandidate {
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.overall_score > best.overall_score {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn scores(entries: &[(&str, f64)]) -> MetricScores {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn candidate(id: &str, metrics: MetricScores, overall: f64) -> PromptCandidate {
        PromptCandidate {
            id: id.to_string(),
            prompt: format!("prompt for {id}"),
            metrics,
            overall_score: overall,
            parents: Vec::new(),
            discovered_at_iteration: 0,
        }
    }

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_dominates() {
        let dimensions = dims(&["tone", "accuracy"]);
        let a = scores(&[("tone", 0.9), ("accuracy", 0.8)]);
        let b = scores(&[("tone", 0.5), ("accuracy", 0.8)]);

        assert!(dominates(&a, &b, &dimensions));
        assert!(!dominates(&b, &a, &dimensions));
        // Equal on everything: no strict inequality.
        assert!(!dominates(&a, &a, &dimensions));
        // Empty dimension set never dominates.
        assert!(!dominates(&a, &b, &[]));
    }

    #[test]
    fn test_dominates_missing_dimension_counts_as_zero() {
        let dimensions = dims(&["tone", "accuracy"]);
        let full = scores(&[("tone", 0.5), ("accuracy", 0.5)]);
        let partial = scores(&[("tone", 0.5)]);

        assert!(dominates(&full, &partial, &dimensions));
        assert!(!dominates(&partial, &full, &dimensions));
    }

    #[test]
    fn test_observe_best_non_decreasing() {
        let mut frontier = ParetoFrontier::new(2);

        frontier.observe("seed", &[(0, 0.4), (1, 0.6)]);
        assert_eq!(frontier.best(0), Some(0.4));
        assert_eq!(frontier.best(1), Some(0.6));

        // Lower score on sample 1 leaves its best untouched.
        frontier.observe("candidate-1", &[(0, 0.7), (1, 0.2)]);
        assert_eq!(frontier.best(0), Some(0.7));
        assert_eq!(frontier.best(1), Some(0.6));

        let best_1 = frontier.best_candidates(1).expect("sample exists");
        assert!(best_1.contains("seed"));
        assert!(!best_1.contains("candidate-1"));
    }

    #[test]
    fn test_observe_tie_extends_set() {
        let mut frontier = ParetoFrontier::new(1);
        frontier.observe("seed", &[(0, 0.5)]);
        frontier.observe("candidate-1", &[(0, 0.5)]);

        let tied = frontier.best_candidates(0).expect("sample exists");
        assert_eq!(tied.len(), 2);
        assert!(tied.contains("seed"));
        assert!(tied.contains("candidate-1"));
    }

    #[test]
    fn test_observe_out_of_range_index_ignored() {
        let mut frontier = ParetoFrontier::new(1);
        frontier.observe("seed", &[(5, 0.9)]);
        assert_eq!(frontier.best(0), None);
    }

    #[test]
    fn test_pareto_diversity_scenario() {
        // Two dimensions; A and B trade off, C dominates both.
        let dimensions = dims(&["tone", "accuracy"]);
        let mut frontier = ParetoFrontier::new(1);

        let a = candidate("A", scores(&[("tone", 0.9), ("accuracy", 0.5)]), 0.7);
        let b = candidate("B", scores(&[("tone", 0.5), ("accuracy", 0.9)]), 0.7);
        frontier.update_frontier(&a, &dimensions);
        frontier.update_frontier(&b, &dimensions);
        assert_eq!(frontier.len(), 2);

        let c = candidate("C", scores(&[("tone", 0.95), ("accuracy", 0.95)]), 0.95);
        frontier.update_frontier(&c, &dimensions);
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.frontier_ids(), vec!["C"]);
    }

    #[test]
    fn test_dominated_newcomer_not_admitted() {
        let dimensions = dims(&["tone", "accuracy"]);
        let mut frontier = ParetoFrontier::new(1);

        let strong = candidate("strong", scores(&[("tone", 0.9), ("accuracy", 0.9)]), 0.9);
        frontier.update_frontier(&strong, &dimensions);

        let weak = candidate("weak", scores(&[("tone", 0.5), ("accuracy", 0.5)]), 0.5);
        frontier.update_frontier(&weak, &dimensions);

        assert_eq!(frontier.frontier_ids(), vec!["strong"]);
    }

    #[test]
    fn test_frontier_members_mutually_non_dominated() {
        let dimensions = dims(&["tone", "accuracy"]);
        let mut frontier = ParetoFrontier::new(1);

        let inputs = [
            candidate("a", scores(&[("tone", 0.2), ("accuracy", 0.9)]), 0.55),
            candidate("b", scores(&[("tone", 0.9), ("accuracy", 0.2)]), 0.55),
            candidate("c", scores(&[("tone", 0.6), ("accuracy", 0.6)]), 0.6),
            candidate("d", scores(&[("tone", 0.1), ("accuracy", 0.1)]), 0.1),
        ];
        for input in &inputs {
            frontier.update_frontier(input, &dimensions);
        }

        for left in &frontier.entries {
            for right in &frontier.entries {
                if left.id != right.id {
                    assert!(!dominates(&left.metrics, &right.metrics, &dimensions));
                }
            }
        }
        assert!(!frontier.frontier_ids().contains(&"d"));
    }

    #[test]
    fn test_current_best_selector_prefers_earliest_tie() {
        let candidates = vec![
            candidate("seed", scores(&[("accuracy", 0.5)]), 0.5),
            candidate("candidate-1", scores(&[("accuracy", 0.5)]), 0.5),
            candidate("candidate-2", scores(&[("accuracy", 0.8)]), 0.8),
        ];
        let frontier = ParetoFrontier::new(1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let parent = select_parent(SelectorKind::CurrentBest, &candidates, &frontier, &mut rng);
        assert_eq!(parent.id, "candidate-2");

        let tied = vec![
            candidate("seed", scores(&[("accuracy", 0.5)]), 0.5),
            candidate("candidate-1", scores(&[("accuracy", 0.5)]), 0.5),
        ];
        let parent = select_parent(SelectorKind::CurrentBest, &tied, &frontier, &mut rng);
        assert_eq!(parent.id, "seed");
    }

    #[test]
    fn test_pareto_selector_draws_from_pool() {
        let candidates = vec![
            candidate("seed", scores(&[("accuracy", 0.4)]), 0.4),
            candidate("candidate-1", scores(&[("accuracy", 0.9)]), 0.9),
        ];
        let mut frontier = ParetoFrontier::new(2);
        frontier.observe("candidate-1", &[(0, 0.9), (1, 0.8)]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            let parent = select_parent(SelectorKind::Pareto, &candidates, &frontier, &mut rng);
            assert_eq!(parent.id, "candidate-1");
        }
    }

    #[test]
    fn test_pareto_selector_empty_pool_falls_back() {
        let candidates = vec![candidate("seed", scores(&[("accuracy", 0.4)]), 0.4)];
        let frontier = ParetoFrontier::new(1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let parent = select_parent(SelectorKind::Pareto, &candidates, &frontier, &mut rng);
        assert_eq!(parent.id, "seed");
    }
}
