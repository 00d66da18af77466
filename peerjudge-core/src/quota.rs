use crate::constants::{MAX_PER_REVIEWER, MIN_PER_REVIEWER, TARGET_APPEARANCES_PER_ITEM};

/// Per-reviewer quota derived from class size.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuotaPolicy {
    pub min_per_reviewer: usize,
    pub max_per_reviewer: usize,
    /// Comparisons each response should appear in, over all reviewers.
    pub target_appearances_per_item: usize,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy {
            min_per_reviewer: MIN_PER_REVIEWER,
            max_per_reviewer: MAX_PER_REVIEWER,
            target_appearances_per_item: TARGET_APPEARANCES_PER_ITEM,
        }
    }
}

impl QuotaPolicy {
    /// `clamp(ceil(responses * appearances / (2 * reviewers)), min, max)`.
    ///
    /// Each comparison covers two responses, hence the factor 2.
    /// Pure: same inputs, same quota.
    pub fn compute_quota(&self, response_count: usize, reviewer_count: usize) -> usize {
        if reviewer_count == 0 {
            return self.min_per_reviewer;
        }
        let appearances = response_count * self.target_appearances_per_item;
        let quota = appearances.div_ceil(2 * reviewer_count);
        quota.clamp(self.min_per_reviewer, self.max_per_reviewer.max(self.min_per_reviewer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_formula() {
        let policy = QuotaPolicy::default();
        // 30 * 8 / 60 = 4
        assert_eq!(policy.compute_quota(30, 30), 4);
        // 25 * 8 / 40 = 5
        assert_eq!(policy.compute_quota(25, 20), 5);
        // 10 * 8 / 6 = 13.33 -> 14
        assert_eq!(policy.compute_quota(10, 3), 14);
    }

    #[test]
    fn test_quota_bounds() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.compute_quota(2, 100), MIN_PER_REVIEWER);
        assert_eq!(policy.compute_quota(500, 2), MAX_PER_REVIEWER);
        assert_eq!(policy.compute_quota(10, 0), MIN_PER_REVIEWER);
    }

    #[test]
    fn test_quota_is_deterministic() {
        let policy = QuotaPolicy {
            min_per_reviewer: 2,
            max_per_reviewer: 50,
            target_appearances_per_item: 6,
        };
        for responses in 0..40 {
            for reviewers in 0..40 {
                let q = policy.compute_quota(responses, reviewers);
                assert_eq!(q, policy.compute_quota(responses, reviewers));
                assert!((2..=50).contains(&q));
            }
        }
    }
}
