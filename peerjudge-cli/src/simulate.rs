/// Simulate command: run synthetic reviewers concurrently against one session.
///
/// Each response gets a hidden true quality. Honest reviewers pick the better
/// response with noise and take several seconds; careless reviewers always pick
/// the left side within a second or two. Useful for watching the phase switch
/// and the quality signals on realistic traffic.
use peerjudge_core::{
    Outcome, QualityReport, ResponseItem, SchedulerError, SessionCoordinator, SessionKey,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Reviewer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Simulation semaphore closed")]
    SemaphoreClosed,
}

pub struct SimulationParams {
    pub responses: usize,
    pub reviewers: usize,
    /// Share of reviewers that behave carelessly, 0.0 to 1.0.
    pub careless_share: f64,
    pub concurrency: usize,
    pub seed: u64,
}

/// Synthetic class: responses with hidden qualities and a reviewer roster.
pub struct Class {
    pub responses: Vec<ResponseItem>,
    pub qualities: Vec<f64>,
    pub reviewer_ids: Vec<String>,
    pub careless: Vec<bool>,
}

pub fn build_class(params: &SimulationParams, question_id: &str) -> Class {
    let mut rng = StdRng::seed_from_u64(params.seed);

    let qualities: Vec<f64> = (0..params.responses).map(|_| rng.random::<f64>()).collect();
    let responses = (0..params.responses)
        .map(|i| ResponseItem {
            id: i as i64 + 1,
            owner_code: format!("S{:03}", i + 1),
            text: format!("Response {} (true quality {:.2})", i + 1, qualities[i]),
            question_id: question_id.to_string(),
        })
        .collect();

    let careless_count =
        (params.careless_share.clamp(0.0, 1.0) * params.reviewers as f64).round() as usize;
    let reviewer_ids = (0..params.reviewers).map(|i| format!("S{:03}", i + 1)).collect();
    let careless = (0..params.reviewers).map(|i| i < careless_count).collect();

    Class { responses, qualities, reviewer_ids, careless }
}

/// One simulated judgment: (outcome, latency in ms).
fn judge(quality_a: f64, quality_b: f64, careless: bool, rng: &mut impl Rng) -> (Outcome, u64) {
    if careless {
        return (Outcome::Left, rng.random_range(400..2500));
    }
    let gap = quality_a - quality_b;
    let latency = rng.random_range(4000..20000);
    if gap.abs() < 0.03 {
        return (Outcome::Neutral, latency);
    }
    let p_left = 1.0 / (1.0 + (-6.0 * gap).exp());
    if rng.random::<f64>() < p_left {
        (Outcome::Left, latency)
    } else {
        (Outcome::Right, latency)
    }
}

/// Drive every reviewer to completion with bounded concurrency.
///
/// Recording a decision may hit the disk, so it runs on the blocking pool.
/// Any reviewer task that fails or panics fails the whole run.
pub async fn run_reviewers(
    coordinator: Arc<SessionCoordinator>,
    key: &SessionKey,
    class: &Class,
    params: &SimulationParams,
) -> Result<usize, SimulationError> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(params.concurrency.max(1)));
    let qualities = Arc::new(class.qualities.clone());
    let mut handles = Vec::with_capacity(class.reviewer_ids.len());

    for (idx, reviewer_id) in class.reviewer_ids.iter().enumerate() {
        let sem = semaphore.clone();
        let coordinator = coordinator.clone();
        let qualities = qualities.clone();
        let key = key.clone();
        let reviewer_id = reviewer_id.clone();
        let careless = class.careless[idx];
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(idx as u64 + 1));

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire().await.map_err(|_| SimulationError::SemaphoreClosed)?;
            let mut recorded = 0usize;

            while let Some((a, b)) = coordinator.next_pair(&key, &reviewer_id)? {
                let (qa, qb) = (qualities[(a - 1) as usize], qualities[(b - 1) as usize]);
                let (outcome, latency_ms) = judge(qa, qb, careless, &mut rng);

                let receipt = tokio::task::spawn_blocking({
                    let coordinator = coordinator.clone();
                    let key = key.clone();
                    let reviewer_id = reviewer_id.clone();
                    move || {
                        coordinator.record_decision(&key, &reviewer_id, a, b, outcome, latency_ms)
                    }
                })
                .await??;
                recorded += 1;

                if receipt.quality.should_mirror {
                    // Reshow (b, a). Careless reviewers click left again.
                    let (mirrored, _) = judge(qb, qa, careless, &mut rng);
                    let consistent =
                        coordinator.record_mirror_check(&key, &reviewer_id, outcome, mirrored)?;
                    debug!(reviewer = %reviewer_id, consistent, "mirror reshow answered");
                }
                if receipt.quality.should_show_popup {
                    debug!(reviewer = %reviewer_id, "slow-down popup shown");
                }
            }
            Ok::<usize, SimulationError>(recorded)
        });
        handles.push(handle);
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await??;
    }
    info!(decisions = total, "simulation finished");
    Ok(total)
}

/// Simple trust policy applied after a run: reviewers who contradict
/// themselves on mirror reshows lose weight.
pub fn trust_from_report(report: &QualityReport) -> (f64, bool) {
    let weight = (1.0 - report.inconsistency_rate).max(0.0);
    let low_agreement = report.state.mirror_checks > 0 && report.inconsistency_rate > 0.5;
    (weight, low_agreement)
}

pub fn apply_trust_policy(
    coordinator: &SessionCoordinator,
    key: &SessionKey,
) -> Result<(), SchedulerError> {
    for report in coordinator.quality_reports(key)? {
        let (weight, low_agreement) = trust_from_report(&report);
        coordinator.set_trust(key, &report.reviewer_id, weight, low_agreement)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerjudge_core::{MemoryStore, ReviewerProgress, SessionConfig};

    fn params(reviewers: usize, careless_share: f64) -> SimulationParams {
        SimulationParams {
            responses: 12,
            reviewers,
            careless_share,
            concurrency: 4,
            seed: 11,
        }
    }

    #[test]
    fn test_build_class_is_seeded() {
        let a = build_class(&params(10, 0.3), "q1");
        let b = build_class(&params(10, 0.3), "q1");
        assert_eq!(a.qualities, b.qualities);
        assert_eq!(a.careless.iter().filter(|&&c| c).count(), 3);
        assert_eq!(a.responses[0].id, 1);
        assert_eq!(a.reviewer_ids.len(), 10);
    }

    #[test]
    fn test_careless_judge_is_fast_and_left() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let (outcome, latency) = judge(0.1, 0.9, true, &mut rng);
            assert_eq!(outcome, Outcome::Left);
            assert!(latency < 3000);
        }
        let (outcome, latency) = judge(0.5, 0.51, false, &mut rng);
        assert_eq!(outcome, Outcome::Neutral);
        assert!(latency >= 4000);
    }

    #[tokio::test]
    async fn test_simulation_completes_every_reviewer() {
        let p = params(8, 0.25);
        let class = build_class(&p, "q1");
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::new(MemoryStore::new()),
            SessionConfig::default(),
        ));
        let key = SessionKey::new("sim", "q1");
        let info = coordinator.open_session(&key, &class.responses, &class.reviewer_ids).unwrap();

        let total = run_reviewers(coordinator.clone(), &key, &class, &p).await.unwrap();
        assert_eq!(total, info.per_reviewer_quota * class.reviewer_ids.len());

        for id in &class.reviewer_ids {
            let progress = coordinator.reviewer_progress(&key, id).unwrap();
            assert_eq!(progress, ReviewerProgress::Completed);
        }

        // Careless reviewers trip both checks; honest ones stay clean on speed.
        let careless = coordinator.quality_report(&key, "S001").unwrap();
        assert!(careless.state.popups_shown > 0);
        assert!(careless.state.mirrors_signalled > 0);
        let honest = coordinator.quality_report(&key, "S008").unwrap();
        assert_eq!(honest.state.short_count, 0);

        apply_trust_policy(&coordinator, &key).unwrap();
        let careless = coordinator.quality_report(&key, "S001").unwrap();
        assert!(careless.state.low_agreement);
        assert!(careless.state.final_weight < 0.5);
    }

    #[tokio::test]
    async fn test_panicked_reviewer_fails_the_run() {
        let p = params(2, 0.0);
        let mut class = build_class(&p, "q1");
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::new(MemoryStore::new()),
            SessionConfig::default(),
        ));
        let key = SessionKey::new("sim", "q1");
        coordinator.open_session(&key, &class.responses, &class.reviewer_ids).unwrap();

        // Every pair touches an item past the first, whose quality is now missing.
        class.qualities.truncate(1);
        let err = run_reviewers(coordinator, &key, &class, &p).await.unwrap_err();
        assert!(matches!(err, SimulationError::Task(ref e) if e.is_panic()));
    }
}
