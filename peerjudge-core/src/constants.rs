/// Number of highest-priority candidates the next pair is drawn from.
/// Picking uniformly among the top few keeps reviewers from predicting
/// (and gaming) the schedule while still favouring useful pairs.
pub const TOP_CANDIDATES: usize = 5;

/// Length of each reviewer's recently-seen item ring buffer.
pub const RECENT_WINDOW: usize = 10;

/// Temp score moved from loser to winner on a decisive outcome.
pub const SCORE_ADJUSTMENT: f64 = 0.1;

/// Fraction of the score gap closed on each side by a neutral outcome.
pub const NEUTRAL_PULL: f64 = 0.05;

/// Share of the total target comparisons after which pairing switches
/// from `balance` to `adaptive`.
pub const PHASE_THRESHOLD_RATIO: f64 = 0.2;

/// Adaptive priority: base value before penalties.
pub const ADAPTIVE_BASE_PRIORITY: f64 = 100.0;
/// Adaptive priority: penalty per unit of temp-score gap.
pub const ADAPTIVE_SCORE_GAP_WEIGHT: f64 = 10.0;
/// Adaptive priority: weight of the combined remaining need.
pub const ADAPTIVE_NEED_WEIGHT: f64 = 0.3;
/// Adaptive priority: penalty per pair member found in the recent buffer.
pub const ADAPTIVE_RECENCY_WEIGHT: f64 = 5.0;

/// Consecutive same-side choices that trigger a mirror signal.
pub const CONSECUTIVE_BIAS_THRESHOLD: u32 = 5;

/// Decisions faster than this are counted as short.
pub const SHORT_RESPONSE_THRESHOLD_MS: u64 = 3000;

/// Consecutive short decisions that trigger the slow-down popup.
pub const SHORT_STREAK_FOR_POPUP: u32 = 3;

/// Decisions that must pass after a popup before another may be shown.
pub const POPUP_COOLDOWN: u32 = 10;

/// Default trust multiplier for a reviewer's judgments.
pub const DEFAULT_FINAL_WEIGHT: f64 = 1.0;

/// Lower bound of the per-reviewer comparison quota.
pub const MIN_PER_REVIEWER: usize = 3;

/// Upper bound of the per-reviewer comparison quota.
pub const MAX_PER_REVIEWER: usize = 20;

/// How many comparisons each response should take part in, summed over
/// all reviewers, when the quota is derived from the class size.
pub const TARGET_APPEARANCES_PER_ITEM: usize = 8;
