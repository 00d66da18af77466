/// Pair scheduler for one question session.
///
/// Holds per-item and per-reviewer state, hands out the next pair for a
/// reviewer, and applies recorded decisions. No IO: persistence and locking
/// belong to the caller (see `session`).
///
/// Items are identified by caller-provided `i64` IDs, reviewers by string IDs.
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::constants::{
    NEUTRAL_PULL, PHASE_THRESHOLD_RATIO, RECENT_WINDOW, SCORE_ADJUSTMENT, TOP_CANDIDATES,
};
use crate::error::SchedulerError;
use crate::pairing::{draw_rng, has_candidate, pick_from_top, rank_candidates};
use crate::phase::{Phase, PhaseController};
use crate::scoring::ScoreTracker;
use crate::types::{
    percent, CompletedPairSet, CompletionStats, Decision, IdMap, ItemState, Outcome, Pair,
    ProvisionalRank, ReplaySummary, ResponseItem, ReviewerProgress, ReviewerState,
    ReviewerStats,
};

/// Configuration for the pair scheduler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Next pair is drawn uniformly from this many top-priority candidates.
    pub top_candidates: usize,
    /// Size of each reviewer's recently-seen buffer.
    pub recent_window: usize,
    pub score_adjustment: f64,
    pub neutral_pull: f64,
    /// Fraction of total target comparisons that ends the balance phase.
    pub phase_threshold_ratio: f64,
    /// Session seed for the top-candidate draw.
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            top_candidates: TOP_CANDIDATES,
            recent_window: RECENT_WINDOW,
            score_adjustment: SCORE_ADJUSTMENT,
            neutral_pull: NEUTRAL_PULL,
            phase_threshold_ratio: PHASE_THRESHOLD_RATIO,
            seed: 0,
        }
    }
}

/// A decision that passed validation, resolved to internal indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValidatedDecision {
    reviewer: usize,
    a: usize,
    b: usize,
}

#[derive(Debug, Clone)]
pub struct PairScheduler {
    /// Maps between caller i64 IDs and internal 0..N indices.
    id_map: IdMap,
    /// Indexed by `id_map` position.
    items: Vec<ItemState>,

    reviewers: Vec<ReviewerState>,
    reviewer_index: HashMap<String, usize>,
    /// Indexed like `reviewers`.
    completed: Vec<CompletedPairSet>,
    /// Sum of all completed pair set sizes.
    completed_pairs: usize,

    per_reviewer_quota: usize,
    total_target: usize,

    phase: PhaseController,
    tracker: ScoreTracker,
    config: SchedulerConfig,
}

impl PairScheduler {
    /// Fresh state for a response set and reviewer roster.
    ///
    /// Every item starts with `need = 2 * total_target / items`, where
    /// `total_target = reviewers * per_reviewer_quota`.
    pub fn new(
        responses: &[ResponseItem],
        reviewer_ids: &[String],
        per_reviewer_quota: usize,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let item_ids: Vec<i64> = responses.iter().map(|r| r.id).collect();
        let id_map = IdMap::from_ids(&item_ids)?;

        let mut reviewer_index = HashMap::with_capacity(reviewer_ids.len());
        for (idx, id) in reviewer_ids.iter().enumerate() {
            if reviewer_index.insert(id.clone(), idx).is_some() {
                return Err(SchedulerError::InvalidInput(format!("duplicate reviewer ID: {id}")));
            }
        }

        let total_target = reviewer_ids.len() * per_reviewer_quota;
        let initial_need = if responses.is_empty() {
            0.0
        } else {
            (2 * total_target) as f64 / responses.len() as f64
        };

        Ok(PairScheduler {
            id_map,
            items: vec![ItemState::new(initial_need); responses.len()],
            reviewers: reviewer_ids
                .iter()
                .map(|id| ReviewerState::new(id, per_reviewer_quota))
                .collect(),
            reviewer_index,
            completed: vec![CompletedPairSet::default(); reviewer_ids.len()],
            completed_pairs: 0,
            per_reviewer_quota,
            total_target,
            phase: PhaseController::new(total_target, config.phase_threshold_ratio),
            tracker: ScoreTracker::new(config.score_adjustment, config.neutral_pull),
            config,
        })
    }

    /// Build state and replay a decision history on top of it.
    ///
    /// Replay applies exactly the transitions of live recording, so the result
    /// is identical to having processed `history` one decision at a time.
    pub fn initialize(
        responses: &[ResponseItem],
        reviewer_ids: &[String],
        per_reviewer_quota: usize,
        history: &[Decision],
        config: SchedulerConfig,
    ) -> Result<(Self, ReplaySummary), SchedulerError> {
        let mut scheduler = Self::new(responses, reviewer_ids, per_reviewer_quota, config)?;
        let summary = scheduler.replay(history, |_| Ok(()))?;
        Ok((scheduler, summary))
    }

    /// Apply past decisions in order. Decisions that would be rejected live
    /// (unknown item or reviewer, repeated pair, exhausted quota) are skipped.
    ///
    /// `on_applied` sees every decision that was applied, in order, so other
    /// per-decision state can be rebuilt from the same pass.
    pub fn replay<F>(
        &mut self,
        history: &[Decision],
        mut on_applied: F,
    ) -> Result<ReplaySummary, SchedulerError>
    where
        F: FnMut(&Decision) -> Result<(), SchedulerError>,
    {
        let mut summary = ReplaySummary::default();
        for decision in history {
            match self.validate_decision(&decision.reviewer_id, decision.item_a, decision.item_b) {
                Ok(valid) => {
                    self.apply_decision(valid, decision.outcome);
                    on_applied(decision)?;
                    summary.applied += 1;
                }
                Err(e) => {
                    warn!(
                        reviewer = %decision.reviewer_id,
                        item_a = decision.item_a,
                        item_b = decision.item_b,
                        "skipping decision during replay: {e}"
                    );
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Next pair for a reviewer, or `None` when their quota is used up or
    /// every pair has been judged by them. Does not change any state.
    pub fn next_pair(&self, reviewer_id: &str) -> Result<Option<Pair>, SchedulerError> {
        let r = self.reviewer_idx(reviewer_id)?;
        let reviewer = &self.reviewers[r];
        if reviewer.remaining_quota == 0 {
            return Ok(None);
        }

        let candidates = rank_candidates(
            &self.id_map,
            &self.items,
            reviewer,
            &self.completed[r],
            self.phase.phase(),
        );
        let mut rng = draw_rng(self.config.seed, reviewer_id, reviewer.total_comparisons);

        Ok(pick_from_top(&candidates, self.config.top_candidates, &mut rng)
            .map(|(a, b)| (self.id_map.to_id(a), self.id_map.to_id(b))))
    }

    /// Record a judgment of `item_a` (left) vs `item_b` (right).
    ///
    /// Rejects unknown IDs (`NotFound`), a pair this reviewer already judged
    /// (`Conflict`), a self-pair and an exhausted quota, all without touching state.
    pub fn record_decision(
        &mut self,
        reviewer_id: &str,
        item_a: i64,
        item_b: i64,
        outcome: Outcome,
    ) -> Result<Phase, SchedulerError> {
        let valid = self.validate_decision(reviewer_id, item_a, item_b)?;
        Ok(self.apply_decision(valid, outcome))
    }

    pub(crate) fn validate_decision(
        &self,
        reviewer_id: &str,
        item_a: i64,
        item_b: i64,
    ) -> Result<ValidatedDecision, SchedulerError> {
        let reviewer = self.reviewer_idx(reviewer_id)?;
        let a = self.id_map.to_idx(item_a)?;
        let b = self.id_map.to_idx(item_b)?;

        if a == b {
            return Err(SchedulerError::InvalidInput(format!(
                "item {item_a} cannot be compared with itself"
            )));
        }
        if self.completed[reviewer].contains(item_a, item_b) {
            return Err(SchedulerError::Conflict {
                reviewer_id: reviewer_id.to_string(),
                item_a,
                item_b,
            });
        }
        if self.reviewers[reviewer].remaining_quota == 0 {
            return Err(SchedulerError::QuotaExhausted {
                reviewer_id: reviewer_id.to_string(),
            });
        }

        Ok(ValidatedDecision { reviewer, a, b })
    }

    /// Apply every effect of one decision. Cannot fail once validated.
    pub(crate) fn apply_decision(&mut self, valid: ValidatedDecision, outcome: Outcome) -> Phase {
        let ValidatedDecision { reviewer, a, b } = valid;
        let (id_a, id_b) = (self.id_map.to_id(a), self.id_map.to_id(b));

        self.completed[reviewer].insert(id_a, id_b);
        self.completed_pairs += 1;

        let window = self.config.recent_window;
        let state = &mut self.reviewers[reviewer];
        state.remaining_quota -= 1;
        state.total_comparisons += 1;
        state.remember(id_a, window);
        state.remember(id_b, window);

        for idx in [a, b] {
            let item = &mut self.items[idx];
            item.need = (item.need - 1.0).max(0.0);
            item.total_comparisons += 1;
        }

        let (item_a, item_b) = pair_mut(&mut self.items, a, b);
        self.tracker.update_temp_scores(item_a, item_b, outcome);

        let phase = self.phase.check(self.completed_pairs);

        debug!(
            reviewer = %self.reviewers[reviewer].id,
            item_a = id_a,
            item_b = id_b,
            ?outcome,
            remaining = self.reviewers[reviewer].remaining_quota,
            %phase,
            "decision applied"
        );
        phase
    }

    pub fn completion_stats(&self) -> CompletionStats {
        let total_completed: usize = self.reviewers.iter().map(|r| r.completed()).sum();
        let completed_reviewers = (0..self.reviewers.len())
            .filter(|&r| self.progress_of(r) == ReviewerProgress::Completed)
            .count();

        CompletionStats {
            total_completed,
            target: self.total_target,
            progress_pct: percent(total_completed, self.total_target),
            phase: self.phase.phase(),
            completed_reviewers,
            total_reviewers: self.reviewers.len(),
        }
    }

    pub fn reviewer_stats(&self, reviewer_id: &str) -> Result<ReviewerStats, SchedulerError> {
        let reviewer = &self.reviewers[self.reviewer_idx(reviewer_id)?];
        Ok(ReviewerStats {
            completed: reviewer.completed(),
            remaining: reviewer.remaining_quota,
            target: reviewer.target_quota,
            progress_pct: percent(reviewer.completed(), reviewer.target_quota),
        })
    }

    pub fn reviewer_progress(&self, reviewer_id: &str) -> Result<ReviewerProgress, SchedulerError> {
        Ok(self.progress_of(self.reviewer_idx(reviewer_id)?))
    }

    fn progress_of(&self, r: usize) -> ReviewerProgress {
        let reviewer = &self.reviewers[r];
        if reviewer.remaining_quota == 0 || !has_candidate(&self.id_map, &self.completed[r]) {
            ReviewerProgress::Completed
        } else if reviewer.total_comparisons == 0 {
            ReviewerProgress::NotStarted
        } else {
            ReviewerProgress::InProgress
        }
    }

    /// Items ordered by temp score, best first.
    pub fn provisional_ranking(&self) -> Vec<ProvisionalRank> {
        let mut ranking: Vec<ProvisionalRank> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, s)| ProvisionalRank {
                item: self.id_map.to_id(idx),
                temp_score: s.temp_score,
                wins: s.wins,
                losses: s.losses,
                comparisons: s.total_comparisons,
            })
            .collect();
        ranking.sort_by(|x, y| {
            y.temp_score
                .partial_cmp(&x.temp_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranking
    }

    pub fn item_state(&self, item_id: i64) -> Result<&ItemState, SchedulerError> {
        Ok(&self.items[self.id_map.to_idx(item_id)?])
    }

    pub fn reviewer_state(&self, reviewer_id: &str) -> Result<&ReviewerState, SchedulerError> {
        Ok(&self.reviewers[self.reviewer_idx(reviewer_id)?])
    }

    pub fn reviewer_ids(&self) -> impl Iterator<Item = &str> {
        self.reviewers.iter().map(|r| r.id.as_str())
    }

    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    pub fn per_reviewer_quota(&self) -> usize {
        self.per_reviewer_quota
    }

    pub fn total_target(&self) -> usize {
        self.total_target
    }

    /// Unique pairs judged, summed over reviewers.
    pub fn completed_pairs(&self) -> usize {
        self.completed_pairs
    }

    pub fn num_items(&self) -> usize {
        self.id_map.len()
    }

    fn reviewer_idx(&self, reviewer_id: &str) -> Result<usize, SchedulerError> {
        self.reviewer_index
            .get(reviewer_id)
            .copied()
            .ok_or_else(|| SchedulerError::reviewer_not_found(reviewer_id))
    }
}

/// Two distinct mutable borrows out of one slice.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = slice.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}
