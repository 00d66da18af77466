/// Reviewer quality monitoring.
///
/// Watches the decision stream of each reviewer, independently of pairing,
/// for two low-effort patterns:
///   - consecutive-side bias: always picking the same side (mirror signal)
///   - rushing: several very fast decisions in a row (slow-down popup)
///
/// The per-reviewer state is a pure reducer, `(state, decision) -> (state', signal)`,
/// so a rebuilt monitor over the same log ends up identical.
///
/// `final_weight` and `low_agreement` are trust fields set by the aggregation
/// layer; this module only stores them next to the raw counters.
use std::collections::HashMap;

use crate::constants::{
    CONSECUTIVE_BIAS_THRESHOLD, DEFAULT_FINAL_WEIGHT, POPUP_COOLDOWN, SHORT_RESPONSE_THRESHOLD_MS,
    SHORT_STREAK_FOR_POPUP,
};
use crate::error::SchedulerError;
use crate::types::Outcome;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityConfig {
    pub consecutive_bias_threshold: u32,
    pub short_response_threshold_ms: u64,
    pub short_streak_for_popup: u32,
    /// Counted in decisions, not seconds.
    pub popup_cooldown: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            consecutive_bias_threshold: CONSECUTIVE_BIAS_THRESHOLD,
            short_response_threshold_ms: SHORT_RESPONSE_THRESHOLD_MS,
            short_streak_for_popup: SHORT_STREAK_FOR_POPUP,
            popup_cooldown: POPUP_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MirrorType {
    ConsecutiveBias,
}

/// What the UI layer should do after one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualitySignal {
    pub should_mirror: bool,
    pub mirror_type: Option<MirrorType>,
    pub should_show_popup: bool,
    pub is_short_response: bool,
}

/// Raw quality counters for one reviewer on one question.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReviewerQualityState {
    pub total_decisions: u32,
    pub left_count: u32,
    pub right_count: u32,
    pub neutral_count: u32,

    pub consecutive_left: u32,
    pub consecutive_right: u32,
    pub max_consecutive_left: u32,
    pub max_consecutive_right: u32,

    pub short_count: u32,
    pub consecutive_short: u32,
    pub max_consecutive_short: u32,
    pub popup_cooldown: u32,
    pub popups_shown: u32,
    pub mirrors_signalled: u32,

    /// Mirror reshows whose result was reported back.
    pub mirror_checks: u32,
    /// Reshows where the reviewer contradicted their first answer.
    pub inconsistencies: u32,

    pub final_weight: f64,
    pub low_agreement: bool,
}

impl Default for ReviewerQualityState {
    fn default() -> Self {
        ReviewerQualityState {
            total_decisions: 0,
            left_count: 0,
            right_count: 0,
            neutral_count: 0,
            consecutive_left: 0,
            consecutive_right: 0,
            max_consecutive_left: 0,
            max_consecutive_right: 0,
            short_count: 0,
            consecutive_short: 0,
            max_consecutive_short: 0,
            popup_cooldown: 0,
            popups_shown: 0,
            mirrors_signalled: 0,
            mirror_checks: 0,
            inconsistencies: 0,
            final_weight: DEFAULT_FINAL_WEIGHT,
            low_agreement: false,
        }
    }
}

impl ReviewerQualityState {
    /// Fold one decision into the counters. Bias and speed checks run
    /// independently; either, both or neither may fire.
    pub fn apply(
        &self,
        outcome: Outcome,
        latency_ms: u64,
        config: &QualityConfig,
    ) -> (Self, QualitySignal) {
        let mut next = self.clone();
        let mut signal = QualitySignal::default();
        next.total_decisions += 1;

        // Bias
        match outcome {
            Outcome::Left => {
                next.left_count += 1;
                next.consecutive_right = 0;
                next.consecutive_left += 1;
                next.max_consecutive_left = next.max_consecutive_left.max(next.consecutive_left);
            }
            Outcome::Right => {
                next.right_count += 1;
                next.consecutive_left = 0;
                next.consecutive_right += 1;
                next.max_consecutive_right = next.max_consecutive_right.max(next.consecutive_right);
            }
            Outcome::Neutral => {
                next.neutral_count += 1;
                next.consecutive_left = 0;
                next.consecutive_right = 0;
            }
        }
        let threshold = config.consecutive_bias_threshold;
        if next.consecutive_left >= threshold || next.consecutive_right >= threshold {
            signal.should_mirror = true;
            signal.mirror_type = Some(MirrorType::ConsecutiveBias);
            next.mirrors_signalled += 1;
        }

        // Speed
        next.popup_cooldown = next.popup_cooldown.saturating_sub(1);
        if latency_ms < config.short_response_threshold_ms {
            signal.is_short_response = true;
            next.short_count += 1;
            next.consecutive_short += 1;
            next.max_consecutive_short = next.max_consecutive_short.max(next.consecutive_short);
        } else {
            next.consecutive_short = 0;
        }
        if next.consecutive_short >= config.short_streak_for_popup && next.popup_cooldown == 0 {
            signal.should_show_popup = true;
            next.consecutive_short = 0;
            next.popup_cooldown = config.popup_cooldown;
            next.popups_shown += 1;
        }

        (next, signal)
    }

    /// Share of decisions faster than the short threshold.
    pub fn short_ratio(&self) -> f64 {
        ratio(self.short_count, self.total_decisions, 0.0)
    }

    /// Share of mirror reshows answered inconsistently.
    pub fn inconsistency_rate(&self) -> f64 {
        ratio(self.inconsistencies, self.mirror_checks, 0.0)
    }

    /// Share of left picks among decisive outcomes. 0.5 = no side preference.
    pub fn side_bias(&self) -> f64 {
        ratio(self.left_count, self.left_count + self.right_count, 0.5)
    }
}

fn ratio(num: u32, den: u32, empty: f64) -> f64 {
    if den == 0 { empty } else { num as f64 / den as f64 }
}

/// Counters plus derived rates, for the aggregation layer and reports.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityReport {
    pub reviewer_id: String,
    pub state: ReviewerQualityState,
    pub short_ratio: f64,
    pub inconsistency_rate: f64,
    pub side_bias: f64,
}

/// Quality state for every reviewer of one question session.
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    config: QualityConfig,
    states: HashMap<String, ReviewerQualityState>,
}

impl QualityMonitor {
    pub fn new(reviewer_ids: &[String], config: QualityConfig) -> Self {
        QualityMonitor {
            config,
            states: reviewer_ids
                .iter()
                .map(|id| (id.clone(), ReviewerQualityState::default()))
                .collect(),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn process_decision(
        &mut self,
        reviewer_id: &str,
        outcome: Outcome,
        latency_ms: u64,
    ) -> Result<QualitySignal, SchedulerError> {
        let state = self
            .states
            .get_mut(reviewer_id)
            .ok_or_else(|| SchedulerError::reviewer_not_found(reviewer_id))?;
        let (next, signal) = state.apply(outcome, latency_ms, &self.config);
        *state = next;
        Ok(signal)
    }

    /// Report the answer to a mirrored reshow. `original` was given on (A, B),
    /// `mirrored` on (B, A). Returns whether the two agree.
    pub fn record_mirror_check(
        &mut self,
        reviewer_id: &str,
        original: Outcome,
        mirrored: Outcome,
    ) -> Result<bool, SchedulerError> {
        let state = self.state_mut(reviewer_id)?;
        let consistent = original.agrees_with_mirror(mirrored);
        state.mirror_checks += 1;
        if !consistent {
            state.inconsistencies += 1;
        }
        Ok(consistent)
    }

    pub fn set_trust(
        &mut self,
        reviewer_id: &str,
        final_weight: f64,
        low_agreement: bool,
    ) -> Result<(), SchedulerError> {
        if !final_weight.is_finite() || final_weight < 0.0 {
            return Err(SchedulerError::InvalidInput(format!(
                "final weight must be a non-negative number, got {final_weight}"
            )));
        }
        let state = self.state_mut(reviewer_id)?;
        state.final_weight = final_weight;
        state.low_agreement = low_agreement;
        Ok(())
    }

    pub fn state(&self, reviewer_id: &str) -> Result<&ReviewerQualityState, SchedulerError> {
        self.states
            .get(reviewer_id)
            .ok_or_else(|| SchedulerError::reviewer_not_found(reviewer_id))
    }

    pub fn report(&self, reviewer_id: &str) -> Result<QualityReport, SchedulerError> {
        let state = self.state(reviewer_id)?;
        Ok(QualityReport {
            reviewer_id: reviewer_id.to_string(),
            state: state.clone(),
            short_ratio: state.short_ratio(),
            inconsistency_rate: state.inconsistency_rate(),
            side_bias: state.side_bias(),
        })
    }

    fn state_mut(
        &mut self,
        reviewer_id: &str,
    ) -> Result<&mut ReviewerQualityState, SchedulerError> {
        self.states
            .get_mut(reviewer_id)
            .ok_or_else(|| SchedulerError::reviewer_not_found(reviewer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> QualityMonitor {
        QualityMonitor::new(&["r1".to_string(), "r2".to_string()], QualityConfig::default())
    }

    #[test]
    fn test_five_lefts_trigger_mirror() {
        let mut m = monitor();
        for i in 1..=4 {
            let signal = m.process_decision("r1", Outcome::Left, 8000).unwrap();
            assert!(!signal.should_mirror, "mirror fired early on decision {i}");
        }
        let signal = m.process_decision("r1", Outcome::Left, 8000).unwrap();
        assert!(signal.should_mirror);
        assert_eq!(signal.mirror_type, Some(MirrorType::ConsecutiveBias));
        assert_eq!(m.state("r1").unwrap().max_consecutive_left, 5);
    }

    #[test]
    fn test_opposite_side_resets_streak() {
        let mut m = monitor();
        for _ in 0..4 {
            m.process_decision("r1", Outcome::Right, 8000).unwrap();
        }
        m.process_decision("r1", Outcome::Left, 8000).unwrap();
        let state = m.state("r1").unwrap();
        assert_eq!(state.consecutive_right, 0);
        assert_eq!(state.consecutive_left, 1);
        assert_eq!(state.max_consecutive_right, 4);

        m.process_decision("r1", Outcome::Neutral, 8000).unwrap();
        assert_eq!(m.state("r1").unwrap().consecutive_left, 0);
    }

    #[test]
    fn test_three_short_decisions_trigger_popup_once() {
        let mut m = monitor();
        assert!(!m.process_decision("r1", Outcome::Left, 1000).unwrap().should_show_popup);
        assert!(!m.process_decision("r1", Outcome::Right, 1500).unwrap().should_show_popup);
        let third = m.process_decision("r1", Outcome::Left, 2999).unwrap();
        assert!(third.should_show_popup);
        assert!(third.is_short_response);

        // Short streak continues inside the cooldown window: no repeat popup.
        for _ in 0..9 {
            let signal = m.process_decision("r1", Outcome::Neutral, 500).unwrap();
            assert!(!signal.should_show_popup);
            assert!(signal.is_short_response);
        }
        // Ten decisions after the popup the cooldown has run out.
        let signal = m.process_decision("r1", Outcome::Neutral, 500).unwrap();
        assert!(signal.should_show_popup);
        assert_eq!(m.state("r1").unwrap().popups_shown, 2);
    }

    #[test]
    fn test_slow_decision_resets_short_streak() {
        let mut m = monitor();
        m.process_decision("r1", Outcome::Left, 1000).unwrap();
        m.process_decision("r1", Outcome::Right, 1000).unwrap();
        let slow = m.process_decision("r1", Outcome::Left, 3000).unwrap();
        assert!(!slow.is_short_response);
        let signal = m.process_decision("r1", Outcome::Right, 1000).unwrap();
        assert!(!signal.should_show_popup);
        assert_eq!(m.state("r1").unwrap().max_consecutive_short, 2);
    }

    #[test]
    fn test_both_signals_on_one_decision() {
        let mut m = monitor();
        let mut last = QualitySignal::default();
        for _ in 0..5 {
            last = m.process_decision("r1", Outcome::Right, 200).unwrap();
        }
        // popup fired at 3, cooldown blocks it at 5; the mirror fires.
        assert!(last.should_mirror);
        assert!(!last.should_show_popup);

        let fresh = ReviewerQualityState {
            consecutive_left: 4,
            consecutive_short: 2,
            ..Default::default()
        };
        let (_, signal) = fresh.apply(Outcome::Left, 100, &QualityConfig::default());
        assert!(signal.should_mirror && signal.should_show_popup);
    }

    #[test]
    fn test_reducer_is_pure() {
        let config = QualityConfig::default();
        let start = ReviewerQualityState::default();
        let (a, sa) = start.apply(Outcome::Left, 100, &config);
        let (b, sb) = start.apply(Outcome::Left, 100, &config);
        assert_eq!(a, b);
        assert_eq!(sa, sb);
        assert_eq!(start, ReviewerQualityState::default());
    }

    #[test]
    fn test_mirror_checks_and_rates() {
        let mut m = monitor();
        assert!(m.record_mirror_check("r2", Outcome::Left, Outcome::Right).unwrap());
        assert!(!m.record_mirror_check("r2", Outcome::Left, Outcome::Left).unwrap());
        m.process_decision("r2", Outcome::Left, 1000).unwrap();
        m.process_decision("r2", Outcome::Left, 9000).unwrap();
        m.process_decision("r2", Outcome::Right, 9000).unwrap();
        m.process_decision("r2", Outcome::Neutral, 9000).unwrap();

        let report = m.report("r2").unwrap();
        assert!((report.inconsistency_rate - 0.5).abs() < 1e-10);
        assert!((report.short_ratio - 0.25).abs() < 1e-10);
        assert!((report.side_bias - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_trust_fields() {
        let mut m = monitor();
        assert_eq!(m.state("r1").unwrap().final_weight, 1.0);
        m.set_trust("r1", 0.4, true).unwrap();
        let state = m.state("r1").unwrap();
        assert_eq!(state.final_weight, 0.4);
        assert!(state.low_agreement);
        assert!(m.set_trust("r1", f64::NAN, false).is_err());
        assert!(m.set_trust("r1", -1.0, false).is_err());
    }

    #[test]
    fn test_unknown_reviewer() {
        let mut m = monitor();
        assert!(matches!(
            m.process_decision("ghost", Outcome::Left, 100),
            Err(SchedulerError::NotFound { .. })
        ));
    }
}
