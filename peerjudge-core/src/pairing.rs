/// Candidate generation and priority scoring for the next pair.
///
/// Public functions work with plain numbers and i64 IDs.
/// Internal functions use `usize` indices into the scheduler's item table.
use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{
    ADAPTIVE_BASE_PRIORITY, ADAPTIVE_NEED_WEIGHT, ADAPTIVE_RECENCY_WEIGHT,
    ADAPTIVE_SCORE_GAP_WEIGHT,
};
use crate::phase::Phase;
use crate::types::{CompletedPairSet, IdMap, ItemState, ReviewerState};

/// Priority of showing a pair, floored at 0.
///
///   Balance:  need(A) + need(B)
///   Adaptive: 100 - 10*|score(A) - score(B)| + 0.3*(need(A) + need(B)) - 5*recency
///
/// `recency_penalty` counts how many of the two items sit in the reviewer's
/// recently-seen buffer.
pub fn calculate_priority(
    phase: Phase,
    need_a: f64,
    need_b: f64,
    score_a: f64,
    score_b: f64,
    recency_penalty: usize,
) -> f64 {
    let priority = match phase {
        Phase::Balance => need_a + need_b,
        Phase::Adaptive => {
            ADAPTIVE_BASE_PRIORITY
                - ADAPTIVE_SCORE_GAP_WEIGHT * (score_a - score_b).abs()
                + ADAPTIVE_NEED_WEIGHT * (need_a + need_b)
                - ADAPTIVE_RECENCY_WEIGHT * recency_penalty as f64
        }
    };
    priority.max(0.0)
}

/// Deterministic RNG for one draw of one reviewer.
///
/// Derived from the session seed, the reviewer and how many decisions that
/// reviewer has made, so asking twice before deciding yields the same pair and
/// replaying a log reproduces the same sequence.
pub fn draw_rng(seed: u64, reviewer_id: &str, draw: usize) -> StdRng {
    // FNV-1a over the reviewer id, then fold in seed and draw counter.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in reviewer_id.bytes() {
        h ^= byte as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h ^= seed.rotate_left(17);
    h ^= (draw as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    StdRng::seed_from_u64(h)
}

// ---------------------------------------------------------------------------
// Internal indexed functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub a: usize,
    pub b: usize,
    pub priority: f64,
}

/// Every unordered pair the reviewer has not judged yet, highest priority
/// first. Ties keep enumeration order so the ranking is reproducible.
///
/// O(n^2) in the number of items. Fine for a class-sized response set.
pub(crate) fn rank_candidates(
    id_map: &IdMap,
    items: &[ItemState],
    reviewer: &ReviewerState,
    completed: &CompletedPairSet,
    phase: Phase,
) -> Vec<Candidate> {
    let n = items.len();
    let mut candidates = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            let (id_i, id_j) = (id_map.to_id(i), id_map.to_id(j));
            if completed.contains(id_i, id_j) {
                continue;
            }
            let priority = calculate_priority(
                phase,
                items[i].need,
                items[j].need,
                items[i].temp_score,
                items[j].temp_score,
                reviewer.recency_penalty(id_i, id_j),
            );
            candidates.push(Candidate { a: i, b: j, priority });
        }
    }

    candidates.sort_by(|x, y| y.priority.partial_cmp(&x.priority).unwrap_or(Ordering::Equal));
    candidates
}

/// True if at least one unjudged pair remains, without scoring anything.
pub(crate) fn has_candidate(id_map: &IdMap, completed: &CompletedPairSet) -> bool {
    let n = id_map.len();
    let total_pairs = n * n.saturating_sub(1) / 2;
    completed.len() < total_pairs
}

/// Pick uniformly among the first `top_k` candidates and randomise which
/// item is shown on the left.
pub(crate) fn pick_from_top(
    candidates: &[Candidate],
    top_k: usize,
    rng: &mut impl Rng,
) -> Option<(usize, usize)> {
    if candidates.is_empty() {
        return None;
    }
    let pool = top_k.max(1).min(candidates.len());
    let chosen = candidates[rng.random_range(0..pool)];

    if rng.random::<f64>() < 0.5 {
        Some((chosen.a, chosen.b))
    } else {
        Some((chosen.b, chosen.a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_priority_is_need_sum() {
        let p = calculate_priority(Phase::Balance, 2.5, 1.5, 9.0, -9.0, 2);
        assert!((p - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_adaptive_priority_formula() {
        // 100 - 10*0.3 + 0.3*4 - 5*1 = 93.2
        let p = calculate_priority(Phase::Adaptive, 3.0, 1.0, 0.2, -0.1, 1);
        assert!((p - 93.2).abs() < 1e-10);
    }

    #[test]
    fn test_priority_floored_at_zero() {
        let p = calculate_priority(Phase::Adaptive, 0.0, 0.0, 20.0, -20.0, 2);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn test_rank_candidates_skips_completed_and_sorts() {
        let id_map = IdMap::from_ids(&[10, 20, 30]).unwrap();
        let items = vec![ItemState::new(1.0), ItemState::new(5.0), ItemState::new(3.0)];
        let reviewer = ReviewerState::new("r", 3);
        let mut completed = CompletedPairSet::default();
        completed.insert(30, 20);

        let ranked = rank_candidates(&id_map, &items, &reviewer, &completed, Phase::Balance);
        assert_eq!(ranked.len(), 2);
        // (10,20) = 6.0 beats (10,30) = 4.0
        assert_eq!((ranked[0].a, ranked[0].b), (0, 1));
        assert_eq!((ranked[1].a, ranked[1].b), (0, 2));
        assert!(has_candidate(&id_map, &completed));
    }

    #[test]
    fn test_pick_from_top_stays_in_pool() {
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| Candidate { a: i, b: i + 100, priority: (20 - i) as f64 })
            .collect();
        for draw in 0..200 {
            let mut rng = draw_rng(7, "r1", draw);
            let (x, y) = pick_from_top(&candidates, 5, &mut rng).unwrap();
            let a = x.min(y);
            assert!(a < 5, "picked candidate {a} outside top 5");
        }
        assert!(pick_from_top(&[], 5, &mut draw_rng(0, "r", 0)).is_none());
    }

    #[test]
    fn test_draw_rng_is_deterministic() {
        let mut r1 = draw_rng(42, "alice", 3);
        let mut r2 = draw_rng(42, "alice", 3);
        let mut r3 = draw_rng(42, "bob", 3);
        let a: u64 = r1.random();
        assert_eq!(a, r2.random::<u64>());
        assert_ne!(a, r3.random::<u64>());
    }
}
