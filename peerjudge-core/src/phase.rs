/// Pairing phase control.
///
/// A question session starts in `Balance` (spread comparisons evenly) and
/// switches to `Adaptive` (compare close temp scores) once enough unique
/// pairs have been judged. The switch is one-way.
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Phase {
    Balance,
    Adaptive,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Balance => write!(f, "balance"),
            Phase::Adaptive => write!(f, "adaptive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseController {
    phase: Phase,
    threshold: usize,
}

impl PhaseController {
    /// `threshold = floor(ratio * total_target_comparisons)`.
    pub fn new(total_target_comparisons: usize, ratio: f64) -> Self {
        PhaseController {
            phase: Phase::Balance,
            threshold: (ratio * total_target_comparisons as f64).floor() as usize,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Called after every recorded decision with the number of unique
    /// completed pairs summed over all reviewers.
    pub fn check(&mut self, completed_pairs: usize) -> Phase {
        if self.phase == Phase::Balance && completed_pairs >= self.threshold {
            debug!(
                completed_pairs,
                threshold = self.threshold,
                "switching pairing phase to adaptive"
            );
            self.phase = Phase::Adaptive;
        }
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_floored() {
        assert_eq!(PhaseController::new(24, 0.2).threshold(), 4);
        assert_eq!(PhaseController::new(4, 0.2).threshold(), 0);
    }

    #[test]
    fn test_transition_at_threshold() {
        let mut phase = PhaseController::new(20, 0.2);
        assert_eq!(phase.phase(), Phase::Balance);
        assert_eq!(phase.check(3), Phase::Balance);
        assert_eq!(phase.check(4), Phase::Adaptive);
    }

    #[test]
    fn test_adaptive_never_reverts() {
        let mut phase = PhaseController::new(20, 0.2);
        phase.check(10);
        assert_eq!(phase.check(0), Phase::Adaptive);
        assert_eq!(phase.phase(), Phase::Adaptive);
    }
}
