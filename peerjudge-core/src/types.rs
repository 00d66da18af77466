use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::error::SchedulerError;
use crate::phase::Phase;

/// A submitted answer to one question. Immutable for the lifetime of a session.
///
/// Items are identified by caller-provided `i64` IDs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseItem {
    pub id: i64,
    /// Code of the student who wrote the response.
    pub owner_code: String,
    pub text: String,
    pub question_id: String,
}

/// Which side of a presented pair the reviewer picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Outcome {
    /// Item A wins.
    Left,
    /// Item B wins.
    Right,
    Neutral,
}

impl Outcome {
    /// The outcome expressing the same preference when A and B are swapped.
    pub fn mirrored(self) -> Outcome {
        match self {
            Outcome::Left => Outcome::Right,
            Outcome::Right => Outcome::Left,
            Outcome::Neutral => Outcome::Neutral,
        }
    }

    /// True if `mirrored`, given on the swapped presentation of the same pair,
    /// expresses the same preference as `self`.
    pub fn agrees_with_mirror(self, mirrored: Outcome) -> bool {
        self.mirrored() == mirrored
    }
}

/// One recorded judgment. Append-only; the unit replayed to rehydrate a session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Decision {
    pub reviewer_id: String,
    pub item_a: i64,
    pub item_b: i64,
    pub outcome: Outcome,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// A pairing: two item IDs, shown as (A, B).
pub type Pair = (i64, i64);

/// Per-item provisional state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemState {
    /// Comparisons still wanted for balanced coverage. Never negative.
    pub need: f64,
    /// Provisional Elo-like strength, starts at 0.
    pub temp_score: f64,
    pub total_comparisons: usize,
    pub wins: usize,
    pub losses: usize,
}

impl ItemState {
    pub fn new(need: f64) -> Self {
        ItemState {
            need,
            temp_score: 0.0,
            total_comparisons: 0,
            wins: 0,
            losses: 0,
        }
    }
}

/// Per-reviewer quota and recency state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReviewerState {
    pub id: String,
    pub remaining_quota: usize,
    pub target_quota: usize,
    /// Most recently shown item IDs, oldest first.
    pub recent_items: VecDeque<i64>,
    pub total_comparisons: usize,
}

impl ReviewerState {
    pub fn new(id: &str, quota: usize) -> Self {
        ReviewerState {
            id: id.to_string(),
            remaining_quota: quota,
            target_quota: quota,
            recent_items: VecDeque::new(),
            total_comparisons: 0,
        }
    }

    /// Push an item into the recent buffer, dropping the oldest past `window`.
    pub(crate) fn remember(&mut self, item: i64, window: usize) {
        self.recent_items.push_back(item);
        while self.recent_items.len() > window {
            self.recent_items.pop_front();
        }
    }

    /// How many of the two items appear in the recent buffer (0, 1 or 2).
    pub fn recency_penalty(&self, item_a: i64, item_b: i64) -> usize {
        [item_a, item_b]
            .iter()
            .filter(|id| self.recent_items.contains(id))
            .count()
    }

    pub fn completed(&self) -> usize {
        self.target_quota - self.remaining_quota
    }
}

/// Unordered item pairs a reviewer has already judged. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedPairSet {
    pairs: HashSet<(i64, i64)>,
}

impl CompletedPairSet {
    /// Symmetric key: `key(a, b) == key(b, a)`.
    pub fn key(a: i64, b: i64) -> (i64, i64) {
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn contains(&self, a: i64, b: i64) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    /// Returns false if the pair was already present.
    pub fn insert(&mut self, a: i64, b: i64) -> bool {
        self.pairs.insert(Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Where a reviewer stands for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReviewerProgress {
    NotStarted,
    InProgress,
    /// Quota exhausted or no unjudged pair left. Terminal for the question.
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompletionStats {
    pub total_completed: usize,
    pub target: usize,
    pub progress_pct: f64,
    pub phase: Phase,
    pub completed_reviewers: usize,
    pub total_reviewers: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReviewerStats {
    pub completed: usize,
    pub remaining: usize,
    pub target: usize,
    pub progress_pct: f64,
}

/// An item in the provisional (temp score) ordering. Display only; final
/// scores come from the downstream aggregation model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProvisionalRank {
    pub item: i64,
    pub temp_score: f64,
    pub wins: usize,
    pub losses: usize,
    pub comparisons: usize,
}

/// Counts from rehydrating a session out of its decision log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

pub(crate) fn percent(done: usize, target: usize) -> f64 {
    if target == 0 {
        return 100.0;
    }
    done as f64 / target as f64 * 100.0
}

/// Maps between caller-provided i64 IDs and internal 0..N indices.
#[derive(Debug, Clone)]
pub(crate) struct IdMap {
    ids: Vec<i64>,
    id_to_idx: HashMap<i64, usize>,
}

impl IdMap {
    pub fn from_ids(ids: &[i64]) -> Result<Self, SchedulerError> {
        let mut id_to_idx = HashMap::with_capacity(ids.len());
        for (idx, &id) in ids.iter().enumerate() {
            if id_to_idx.insert(id, idx).is_some() {
                return Err(SchedulerError::InvalidInput(format!("duplicate item ID: {id}")));
            }
        }
        Ok(IdMap {
            ids: ids.to_vec(),
            id_to_idx,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn to_idx(&self, id: i64) -> Result<usize, SchedulerError> {
        self.id_to_idx
            .get(&id)
            .copied()
            .ok_or_else(|| SchedulerError::item_not_found(id))
    }

    pub fn to_id(&self, idx: usize) -> i64 {
        self.ids[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_symmetric() {
        assert_eq!(CompletedPairSet::key(3, 9), CompletedPairSet::key(9, 3));

        let mut set = CompletedPairSet::default();
        assert!(set.insert(9, 3));
        assert!(set.contains(3, 9));
        assert!(!set.insert(3, 9));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_recent_buffer_drops_oldest() {
        let mut reviewer = ReviewerState::new("r1", 5);
        for id in 0..12 {
            reviewer.remember(id, 10);
        }
        assert_eq!(reviewer.recent_items.len(), 10);
        assert_eq!(reviewer.recent_items.front(), Some(&2));
        assert_eq!(reviewer.recency_penalty(0, 11), 1);
        assert_eq!(reviewer.recency_penalty(5, 11), 2);
    }

    #[test]
    fn test_outcome_mirror_agreement() {
        assert!(Outcome::Left.agrees_with_mirror(Outcome::Right));
        assert!(Outcome::Neutral.agrees_with_mirror(Outcome::Neutral));
        assert!(!Outcome::Left.agrees_with_mirror(Outcome::Left));
    }

    #[test]
    fn test_id_map_rejects_duplicates() {
        assert!(IdMap::from_ids(&[1, 2, 1]).is_err());
        let map = IdMap::from_ids(&[10, 20]).unwrap();
        assert_eq!(map.to_idx(20).unwrap(), 1);
        assert!(matches!(map.to_idx(30), Err(SchedulerError::NotFound { .. })));
    }
}
