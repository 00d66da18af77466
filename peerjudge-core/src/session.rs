/// Question session coordination.
///
/// Keeps one scheduler + quality monitor per `(project_id, question_id)` in a
/// concurrency-safe registry. The outer map lock is only held to look a
/// session up or register one, never across store IO or replay; each session
/// then has its own `RwLock`, so pair lookups for a question run in parallel
/// while decisions for that question are serialized.
///
/// Decisions are written to the `DecisionStore` before memory is touched.
/// In-memory state is a cache of the log and can always be rebuilt by replay.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::phase::Phase;
use crate::quality::{QualityConfig, QualityMonitor, QualityReport, QualitySignal};
use crate::quota::QuotaPolicy;
use crate::scheduler::{PairScheduler, SchedulerConfig};
use crate::store::{DecisionStore, SessionKey};
use crate::types::{
    CompletionStats, Decision, Outcome, Pair, ProvisionalRank, ReplaySummary, ResponseItem,
    ReviewerProgress, ReviewerStats,
};

/// Everything a coordinator needs to build sessions.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    pub scheduler: SchedulerConfig,
    pub quality: QualityConfig,
    pub quota: QuotaPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SessionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionInfo {
    pub key: SessionKey,
    pub status: SessionStatus,
    pub per_reviewer_quota: usize,
    pub response_count: usize,
    pub reviewer_count: usize,
    pub decisions: usize,
    pub phase: Phase,
    /// Outcome of the replay the session was last built from.
    pub replay: ReplaySummary,
}

/// Result of an accepted decision.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecisionReceipt {
    pub accepted: bool,
    pub quality: QualitySignal,
    pub phase: Phase,
    pub reviewer_remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterUpdate {
    /// No decisions yet: quota recomputed and state rebuilt.
    Reinitialized { per_reviewer_quota: usize },
    /// Decisions exist: quota and state left as they were.
    Frozen,
}

struct QuestionSession {
    status: SessionStatus,
    scheduler: PairScheduler,
    quality: QualityMonitor,
    replay: ReplaySummary,
}

impl QuestionSession {
    /// Build fresh state and replay `history` through both the scheduler and
    /// the quality monitor. Only decisions the scheduler accepts reach the monitor.
    fn rehydrate(
        responses: &[ResponseItem],
        reviewer_ids: &[String],
        quota: usize,
        history: &[Decision],
        config: &SessionConfig,
    ) -> Result<Self, SchedulerError> {
        let mut scheduler =
            PairScheduler::new(responses, reviewer_ids, quota, config.scheduler.clone())?;
        let mut quality = QualityMonitor::new(reviewer_ids, config.quality.clone());
        let replay = scheduler.replay(history, |d| {
            quality.process_decision(&d.reviewer_id, d.outcome, d.latency_ms).map(|_| ())
        })?;

        Ok(QuestionSession {
            status: SessionStatus::Open,
            scheduler,
            quality,
            replay,
        })
    }

    fn info(&self, key: &SessionKey) -> SessionInfo {
        SessionInfo {
            key: key.clone(),
            status: self.status,
            per_reviewer_quota: self.scheduler.per_reviewer_quota(),
            response_count: self.scheduler.num_items(),
            reviewer_count: self.scheduler.reviewer_ids().count(),
            decisions: self.scheduler.completed_pairs(),
            phase: self.scheduler.phase(),
            replay: self.replay,
        }
    }

    fn ensure_open(&self, key: &SessionKey) -> Result<(), SchedulerError> {
        match self.status {
            SessionStatus::Open => Ok(()),
            SessionStatus::Closed => Err(not_open(key)),
        }
    }
}

fn not_open(key: &SessionKey) -> SchedulerError {
    SchedulerError::SessionNotOpen {
        project_id: key.project_id.clone(),
        question_id: key.question_id.clone(),
    }
}

fn already_open(key: &SessionKey) -> SchedulerError {
    SchedulerError::SessionAlreadyOpen {
        project_id: key.project_id.clone(),
        question_id: key.question_id.clone(),
    }
}

type SharedSession = Arc<RwLock<QuestionSession>>;

fn is_open(session: Option<&SharedSession>) -> Result<bool, SchedulerError> {
    match session {
        Some(session) => {
            let session = session.read().map_err(|_| SchedulerError::LockPoisoned)?;
            Ok(session.status == SessionStatus::Open)
        }
        None => Ok(false),
    }
}

pub struct SessionCoordinator {
    config: SessionConfig,
    store: Arc<dyn DecisionStore>,
    sessions: RwLock<HashMap<SessionKey, SharedSession>>,
}

impl SessionCoordinator {
    pub fn new(store: Arc<dyn DecisionStore>, config: SessionConfig) -> Self {
        SessionCoordinator {
            config,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Per-reviewer quota for a class of this size.
    pub fn compute_quota(&self, response_count: usize, reviewer_count: usize) -> usize {
        self.config.quota.compute_quota(response_count, reviewer_count)
    }

    /// Open the session for `key`, rehydrating from the store.
    ///
    /// Fails with `SessionAlreadyOpen` if one is open. A session with logged
    /// decisions keeps the quota it was first opened with, and never drops
    /// below what any reviewer has already completed. An empty log gets the
    /// quota computed for this roster.
    ///
    /// Store reads and replay run without the registry lock, so other sessions
    /// keep serving while this one loads.
    pub fn open_session(
        &self,
        key: &SessionKey,
        responses: &[ResponseItem],
        reviewer_ids: &[String],
    ) -> Result<SessionInfo, SchedulerError> {
        {
            let sessions = self.sessions.read().map_err(|_| SchedulerError::LockPoisoned)?;
            if is_open(sessions.get(key))? {
                return Err(already_open(key));
            }
        }

        let history = self.store.load(key)?;
        let saved = self.store.load_quota(key)?;
        let quota = if history.is_empty() {
            self.compute_quota(responses.len(), reviewer_ids.len())
        } else {
            saved
                .unwrap_or_else(|| self.compute_quota(responses.len(), reviewer_ids.len()))
                .max(max_decisions_per_reviewer(&history))
        };

        let session =
            QuestionSession::rehydrate(responses, reviewer_ids, quota, &history, &self.config)?;
        let info = session.info(key);

        // Publish the session locked, so nobody reaches it before its quota is stored.
        let shared = Arc::new(RwLock::new(session));
        let mut guard = shared.write().map_err(|_| SchedulerError::LockPoisoned)?;
        let previous = {
            let mut sessions = self.sessions.write().map_err(|_| SchedulerError::LockPoisoned)?;
            if is_open(sessions.get(key))? {
                return Err(already_open(key));
            }
            sessions.insert(key.clone(), Arc::clone(&shared))
        };

        if saved != Some(quota) {
            if let Err(e) = self.store.save_quota(key, quota) {
                guard.status = SessionStatus::Closed;
                drop(guard);
                self.unpublish(key, &shared, previous)?;
                return Err(e.into());
            }
        }
        drop(guard);

        info!(
            session = %key,
            responses = info.response_count,
            reviewers = info.reviewer_count,
            quota,
            replayed = info.replay.applied,
            skipped = info.replay.skipped,
            "session opened"
        );
        Ok(info)
    }

    /// Mark the session closed. Its state stays readable for reporting.
    pub fn close_session(&self, key: &SessionKey) -> Result<SessionInfo, SchedulerError> {
        self.write_open(key, |session| {
            session.status = SessionStatus::Closed;
            Ok(session.info(key))
        })
        .inspect(|info| info!(session = %key, decisions = info.decisions, "session closed"))
    }

    /// Open the next question for the same project, then close the current one.
    /// Reviewer quotas do not carry over. If the next session cannot be opened
    /// the current one stays open.
    pub fn advance_question(
        &self,
        current: &SessionKey,
        next_question_id: &str,
        responses: &[ResponseItem],
        reviewer_ids: &[String],
    ) -> Result<SessionInfo, SchedulerError> {
        self.read(current, |session| session.ensure_open(current))?;

        let next = SessionKey::new(current.project_id.clone(), next_question_id);
        let info = self.open_session(&next, responses, reviewer_ids)?;
        match self.close_session(current) {
            // Closed concurrently: already where it needs to be.
            Ok(_) | Err(SchedulerError::SessionNotOpen { .. }) => {}
            Err(e) => return Err(e),
        }
        info!(from = %current, to = %next, "advanced to next question");
        Ok(info)
    }

    /// React to a changed response set or roster. Rebuilds only while no
    /// decision has been recorded; recorded progress is never invalidated.
    pub fn update_roster(
        &self,
        key: &SessionKey,
        responses: &[ResponseItem],
        reviewer_ids: &[String],
    ) -> Result<RosterUpdate, SchedulerError> {
        let store = Arc::clone(&self.store);
        self.write_open(key, |session| {
            if session.scheduler.completed_pairs() > 0 || !store.load(key)?.is_empty() {
                warn!(
                    session = %key,
                    "roster changed after decisions were recorded; keeping quota"
                );
                return Ok(RosterUpdate::Frozen);
            }
            let quota = self.compute_quota(responses.len(), reviewer_ids.len());
            let rebuilt =
                QuestionSession::rehydrate(responses, reviewer_ids, quota, &[], &self.config)?;
            store.save_quota(key, quota)?;
            *session = rebuilt;
            info!(session = %key, quota, "roster updated, session reinitialized");
            Ok(RosterUpdate::Reinitialized { per_reviewer_quota: quota })
        })
    }

    pub fn next_pair(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
    ) -> Result<Option<Pair>, SchedulerError> {
        self.read(key, |session| {
            session.ensure_open(key)?;
            session.scheduler.next_pair(reviewer_id)
        })
    }

    /// Validate, log, then apply one decision and run the quality checks.
    ///
    /// If the store append fails the error is returned and no in-memory state
    /// has changed.
    pub fn record_decision(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
        item_a: i64,
        item_b: i64,
        outcome: Outcome,
        latency_ms: u64,
    ) -> Result<DecisionReceipt, SchedulerError> {
        let store = Arc::clone(&self.store);
        self.write_open(key, |session| {
            let valid = session.scheduler.validate_decision(reviewer_id, item_a, item_b)?;
            session.quality.state(reviewer_id)?;

            let decision = Decision {
                reviewer_id: reviewer_id.to_string(),
                item_a,
                item_b,
                outcome,
                latency_ms,
                timestamp: Utc::now(),
            };
            store.append(key, &decision)?;

            let phase = session.scheduler.apply_decision(valid, outcome);
            let quality = session.quality.process_decision(reviewer_id, outcome, latency_ms)?;
            let reviewer_remaining = session.scheduler.reviewer_state(reviewer_id)?.remaining_quota;

            if quality.should_mirror || quality.should_show_popup {
                debug!(session = %key, reviewer = reviewer_id, ?quality, "quality signal raised");
            }

            Ok(DecisionReceipt {
                accepted: true,
                quality,
                phase,
                reviewer_remaining,
            })
        })
    }

    /// Report the answer to a mirrored reshow (orchestrated by the caller).
    pub fn record_mirror_check(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
        original: Outcome,
        mirrored: Outcome,
    ) -> Result<bool, SchedulerError> {
        self.write(key, |session| {
            session.quality.record_mirror_check(reviewer_id, original, mirrored)
        })
    }

    pub fn set_trust(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
        final_weight: f64,
        low_agreement: bool,
    ) -> Result<(), SchedulerError> {
        self.write(key, |session| {
            session.quality.set_trust(reviewer_id, final_weight, low_agreement)
        })
    }

    pub fn completion_stats(&self, key: &SessionKey) -> Result<CompletionStats, SchedulerError> {
        self.read(key, |session| Ok(session.scheduler.completion_stats()))
    }

    pub fn reviewer_stats(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
    ) -> Result<ReviewerStats, SchedulerError> {
        self.read(key, |session| session.scheduler.reviewer_stats(reviewer_id))
    }

    pub fn reviewer_progress(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
    ) -> Result<ReviewerProgress, SchedulerError> {
        self.read(key, |session| session.scheduler.reviewer_progress(reviewer_id))
    }

    pub fn quality_report(
        &self,
        key: &SessionKey,
        reviewer_id: &str,
    ) -> Result<QualityReport, SchedulerError> {
        self.read(key, |session| session.quality.report(reviewer_id))
    }

    /// Quality reports for every reviewer, in roster order.
    pub fn quality_reports(&self, key: &SessionKey) -> Result<Vec<QualityReport>, SchedulerError> {
        self.read(key, |session| {
            session
                .scheduler
                .reviewer_ids()
                .map(|id| session.quality.report(id))
                .collect()
        })
    }

    pub fn provisional_ranking(
        &self,
        key: &SessionKey,
    ) -> Result<Vec<ProvisionalRank>, SchedulerError> {
        self.read(key, |session| Ok(session.scheduler.provisional_ranking()))
    }

    pub fn session_info(&self, key: &SessionKey) -> Result<SessionInfo, SchedulerError> {
        self.read(key, |session| Ok(session.info(key)))
    }

    /// Keys of all sessions currently open.
    pub fn open_sessions(&self) -> Result<Vec<SessionKey>, SchedulerError> {
        let snapshot: Vec<(SessionKey, SharedSession)> = {
            let sessions = self.sessions.read().map_err(|_| SchedulerError::LockPoisoned)?;
            sessions.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect()
        };
        let mut keys = Vec::new();
        for (key, session) in snapshot {
            if is_open(Some(&session))? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Undo a publish from `open_session`, restoring whatever was registered before.
    fn unpublish(
        &self,
        key: &SessionKey,
        published: &SharedSession,
        previous: Option<SharedSession>,
    ) -> Result<(), SchedulerError> {
        let mut sessions = self.sessions.write().map_err(|_| SchedulerError::LockPoisoned)?;
        if sessions.get(key).is_some_and(|s| Arc::ptr_eq(s, published)) {
            match previous {
                Some(previous) => sessions.insert(key.clone(), previous),
                None => sessions.remove(key),
            };
        }
        Ok(())
    }

    fn lookup(&self, key: &SessionKey) -> Result<SharedSession, SchedulerError> {
        let sessions = self.sessions.read().map_err(|_| SchedulerError::LockPoisoned)?;
        sessions.get(key).cloned().ok_or_else(|| not_open(key))
    }

    fn read<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&QuestionSession) -> Result<T, SchedulerError>,
    ) -> Result<T, SchedulerError> {
        let session = self.lookup(key)?;
        let guard = session.read().map_err(|_| SchedulerError::LockPoisoned)?;
        f(&guard)
    }

    fn write<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut QuestionSession) -> Result<T, SchedulerError>,
    ) -> Result<T, SchedulerError> {
        let session = self.lookup(key)?;
        let mut guard = session.write().map_err(|_| SchedulerError::LockPoisoned)?;
        f(&mut guard)
    }

    fn write_open<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut QuestionSession) -> Result<T, SchedulerError>,
    ) -> Result<T, SchedulerError> {
        self.write(key, |session| {
            session.ensure_open(key)?;
            f(session)
        })
    }
}

/// Largest number of logged decisions attributed to a single reviewer.
fn max_decisions_per_reviewer(history: &[Decision]) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for decision in history {
        *counts.entry(decision.reviewer_id.as_str()).or_default() += 1;
    }
    counts.into_values().max().unwrap_or(0)
}
