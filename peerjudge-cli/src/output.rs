/// Output formatting: terminal tables and JSON.
use peerjudge_core::{
    CompletionStats, ProvisionalRank, QualityReport, ReviewerProgress, ReviewerStats,
    SchedulerError, SessionCoordinator, SessionInfo, SessionKey,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ReviewerRow {
    pub reviewer_id: String,
    pub progress: ReviewerProgress,
    pub stats: ReviewerStats,
    pub quality: QualityReport,
}

#[derive(Serialize)]
pub struct RankedRow {
    pub rank: usize,
    pub item: i64,
    pub text: String,
    pub temp_score: f64,
    pub wins: usize,
    pub losses: usize,
    pub comparisons: usize,
}

/// Everything printed at the end of `simulate` and `replay`.
#[derive(Serialize)]
pub struct SessionReport {
    pub session: SessionInfo,
    pub completion: CompletionStats,
    pub reviewers: Vec<ReviewerRow>,
    pub ranking: Vec<RankedRow>,
}

impl SessionReport {
    /// Collect a report for one session. `text_of` resolves an item ID to its text.
    pub fn collect(
        coordinator: &SessionCoordinator,
        key: &SessionKey,
        text_of: impl Fn(i64) -> String,
    ) -> Result<Self, SchedulerError> {
        let session = coordinator.session_info(key)?;
        let completion = coordinator.completion_stats(key)?;

        let mut reviewers = Vec::new();
        for quality in coordinator.quality_reports(key)? {
            let id = quality.reviewer_id.clone();
            reviewers.push(ReviewerRow {
                progress: coordinator.reviewer_progress(key, &id)?,
                stats: coordinator.reviewer_stats(key, &id)?,
                reviewer_id: id,
                quality,
            });
        }

        let ranking = coordinator
            .provisional_ranking(key)?
            .into_iter()
            .enumerate()
            .map(|(i, r): (usize, ProvisionalRank)| RankedRow {
                rank: i + 1,
                item: r.item,
                text: text_of(r.item),
                temp_score: r.temp_score,
                wins: r.wins,
                losses: r.losses,
                comparisons: r.comparisons,
            })
            .collect();

        Ok(SessionReport { session, completion, reviewers, ranking })
    }
}

fn progress_label(progress: ReviewerProgress) -> &'static str {
    match progress {
        ReviewerProgress::NotStarted => "not started",
        ReviewerProgress::InProgress => "in progress",
        ReviewerProgress::Completed => "completed",
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Print the report as formatted terminal tables.
pub fn print_table(report: &SessionReport) {
    let c = &report.completion;
    println!(
        "Session {}: {} responses, {} reviewers, quota {} each",
        report.session.key,
        report.session.response_count,
        report.session.reviewer_count,
        report.session.per_reviewer_quota,
    );
    println!(
        "Progress: {}/{} comparisons ({:.1}%), phase {}, {}/{} reviewers done\n",
        c.total_completed,
        c.target,
        c.progress_pct,
        c.phase,
        c.completed_reviewers,
        c.total_reviewers,
    );

    let id_width = report
        .reviewers
        .iter()
        .map(|r| r.reviewer_id.len())
        .max()
        .unwrap_or(8)
        .max(8); // at least "Reviewer"

    println!(
        "{:<id_width$} | Status      | Done/Quota | Short % | Left bias | Max run | Popups \
         | Mirrors | Weight",
        "Reviewer"
    );
    println!(
        "{}-|-------------|------------|---------|-----------|---------|--------|---------|-------",
        "-".repeat(id_width)
    );
    for r in &report.reviewers {
        let q = &r.quality.state;
        println!(
            "{:<id_width$} | {:<11} | {:>4}/{:<5} | {:>7.1} | {:>9.2} | {:>7} | {:>6} | {:>7} \
             | {:>6.2}{}",
            r.reviewer_id,
            progress_label(r.progress),
            r.stats.completed,
            r.stats.target,
            r.quality.short_ratio * 100.0,
            r.quality.side_bias,
            q.max_consecutive_left.max(q.max_consecutive_right),
            q.popups_shown,
            q.mirrors_signalled,
            q.final_weight,
            if q.low_agreement { " (low agreement)" } else { "" },
        );
    }

    let text_width = report
        .ranking
        .iter()
        .map(|r| r.text.chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 40);

    println!("\n # | {:<text_width$} | Temp score |  W |  L | Comparisons", "Item");
    println!("---|-{}-|------------|----|----|------------", "-".repeat(text_width));
    for r in &report.ranking {
        println!(
            "{:>2} | {:<text_width$} | {:>10.3} | {:>2} | {:>2} | {:>11}",
            r.rank,
            truncate(&r.text, text_width),
            r.temp_score,
            r.wins,
            r.losses,
            r.comparisons,
        );
    }
    println!("\nTemp scores are provisional; final ranking is computed downstream.");
}

/// Print the report as JSON.
pub fn print_json(report: &SessionReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => crate::bail(format!("Failed to encode report: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer answer", 8), "a much …");
        assert_eq!(truncate("", 4), "");
    }
}
