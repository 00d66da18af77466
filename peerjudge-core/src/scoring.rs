/// Provisional score tracking.
///
/// Every recorded decision nudges the two items' temp scores. These are a
/// cheap running signal for adaptive pairing, not the final ranking.
use crate::types::{ItemState, Outcome};

/// Step sizes for temp score updates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreTracker {
    /// Moved from loser to winner on a decisive outcome.
    pub adjustment: f64,
    /// Fraction of the gap each side closes on a neutral outcome.
    pub neutral_pull: f64,
}

impl ScoreTracker {
    pub fn new(adjustment: f64, neutral_pull: f64) -> Self {
        ScoreTracker { adjustment, neutral_pull }
    }

    /// Apply one outcome between `a` (shown left) and `b` (shown right).
    pub fn update_temp_scores(&self, a: &mut ItemState, b: &mut ItemState, outcome: Outcome) {
        match outcome {
            Outcome::Left => {
                a.temp_score += self.adjustment;
                b.temp_score -= self.adjustment;
                a.wins += 1;
                b.losses += 1;
            }
            Outcome::Right => {
                b.temp_score += self.adjustment;
                a.temp_score -= self.adjustment;
                b.wins += 1;
                a.losses += 1;
            }
            Outcome::Neutral => {
                let d = a.temp_score - b.temp_score;
                a.temp_score -= self.neutral_pull * d;
                b.temp_score += self.neutral_pull * d;
            }
        }
    }
}

impl Default for ScoreTracker {
    fn default() -> Self {
        ScoreTracker::new(
            crate::constants::SCORE_ADJUSTMENT,
            crate::constants::NEUTRAL_PULL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(score: f64) -> ItemState {
        let mut s = ItemState::new(4.0);
        s.temp_score = score;
        s
    }

    #[test]
    fn test_left_moves_exactly_one_step() {
        let tracker = ScoreTracker::default();
        let (mut a, mut b) = (item(0.3), item(-0.2));
        tracker.update_temp_scores(&mut a, &mut b, Outcome::Left);

        assert!((a.temp_score - 0.4).abs() < 1e-10);
        assert!((b.temp_score - -0.3).abs() < 1e-10);
        assert_eq!((a.wins, a.losses), (1, 0));
        assert_eq!((b.wins, b.losses), (0, 1));
    }

    #[test]
    fn test_right_is_mirror_of_left() {
        let tracker = ScoreTracker::default();
        let (mut a, mut b) = (item(0.0), item(0.0));
        tracker.update_temp_scores(&mut a, &mut b, Outcome::Right);

        assert!((a.temp_score - -0.1).abs() < 1e-10);
        assert!((b.temp_score - 0.1).abs() < 1e-10);
        assert_eq!((a.wins, a.losses), (0, 1));
        assert_eq!((b.wins, b.losses), (1, 0));
    }

    #[test]
    fn test_neutral_pulls_toward_average() {
        let tracker = ScoreTracker::default();
        let (mut a, mut b) = (item(1.0), item(-1.0));
        tracker.update_temp_scores(&mut a, &mut b, Outcome::Neutral);

        // gap 2.0, each side moves 5% of it
        assert!((a.temp_score - 0.9).abs() < 1e-10);
        assert!((b.temp_score - -0.9).abs() < 1e-10);
        // mean preserved, no win/loss bookkeeping
        assert!((a.temp_score + b.temp_score).abs() < 1e-10);
        assert_eq!(a.wins + a.losses + b.wins + b.losses, 0);
    }
}
