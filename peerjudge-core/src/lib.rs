/// peerjudge-core: adaptive pairwise-comparison scheduling for peer review.
///
/// Decides which two responses a reviewer should compare next, keeps a
/// provisional strength score per response, switches from coverage-driven to
/// uncertainty-driven pairing, and flags low-effort reviewing. Final ranking
/// of the accumulated decisions is left to a downstream aggregation model.
///
/// Responses are identified by caller-provided `i64` IDs, reviewers by strings.
///
/// # Quick start
///
/// ```rust
/// use std::sync::Arc;
/// use peerjudge_core::{
///     MemoryStore, Outcome, ResponseItem, SessionConfig, SessionCoordinator, SessionKey,
/// };
///
/// let responses: Vec<ResponseItem> = (1..=4)
///     .map(|id| ResponseItem {
///         id,
///         owner_code: format!("s{id}"),
///         text: format!("answer {id}"),
///         question_id: "q1".into(),
///     })
///     .collect();
/// let reviewers = vec!["alice".to_string(), "bob".to_string()];
///
/// let store = Arc::new(MemoryStore::new());
/// let coordinator = SessionCoordinator::new(store, SessionConfig::default());
/// let key = SessionKey::new("essay-2024", "q1");
/// coordinator.open_session(&key, &responses, &reviewers).unwrap();
///
/// while let Some((a, b)) = coordinator.next_pair(&key, "alice").unwrap() {
///     let receipt = coordinator
///         .record_decision(&key, "alice", a, b, Outcome::Left, 7_500)
///         .unwrap();
///     if receipt.quality.should_mirror {
///         println!("alice keeps picking the same side");
///     }
/// }
///
/// let stats = coordinator.completion_stats(&key).unwrap();
/// println!("{:.0}% done, phase {}", stats.progress_pct, stats.phase);
/// ```

pub mod constants;
pub mod error;
pub mod pairing;
pub mod phase;
pub mod quality;
pub mod quota;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod store;
pub mod types;

// Re-export primary public API at crate root.
pub use error::{SchedulerError, StoreError};
pub use pairing::calculate_priority;
pub use phase::{Phase, PhaseController};
pub use quality::{
    MirrorType, QualityConfig, QualityMonitor, QualityReport, QualitySignal, ReviewerQualityState,
};
pub use quota::QuotaPolicy;
pub use scheduler::{PairScheduler, SchedulerConfig};
pub use scoring::ScoreTracker;
pub use session::{
    DecisionReceipt, RosterUpdate, SessionConfig, SessionCoordinator, SessionInfo, SessionStatus,
};
pub use store::{DecisionStore, MemoryStore, SessionKey};
pub use types::{
    CompletedPairSet, CompletionStats, Decision, ItemState, Outcome, Pair, ProvisionalRank,
    ReplaySummary, ResponseItem, ReviewerProgress, ReviewerState, ReviewerStats,
};
