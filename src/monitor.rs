//! Monitor (C13): a scheduled health check over the job/match store,
//! plus best-effort auto-repair for jobs that were embedded but never
//! scored. Its own scheduling loop is one of the two places in this
//! crate where a native async timer is idiomatic (the other being
//! C12's scoring fan-out) — everything else stays a straight-line call
//! sequence against one shared resource.

use crate::config::{ScorerWeights, TimeAwareSearchConfig};
use crate::db::JobStore;
use crate::resume::ResumeProfile;
use crate::scorer::{self, JobDocument};
use crate::vector_store::{DocumentFilters, VectorStore};
use std::collections::VecDeque;
use std::time::Duration;

const HISTORY_CAPACITY: usize = 100;
const AUTO_REPAIR_BATCH: i64 = 50;

#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub min_match_rate: f64,
    pub min_avg_score: f64,
    pub min_high_quality_ratio: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_match_rate: 0.15,
            min_avg_score: 0.5,
            min_high_quality_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub total_jobs: i64,
    pub total_matches: i64,
    pub match_rate: f64,
    pub avg_score: f64,
    pub high_quality_count: i64,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    LowMatchRate,
    LowAverageScore,
    LowHighQualityRatio,
    DownwardTrend,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alert::LowMatchRate => write!(f, "match rate has fallen below the configured minimum"),
            Alert::LowAverageScore => write!(f, "average match score has fallen below the configured minimum"),
            Alert::LowHighQualityRatio => write!(f, "share of high-quality matches has fallen below the configured minimum"),
            Alert::DownwardTrend => write!(f, "match rate has declined for three consecutive snapshots"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: Snapshot,
    pub alerts: Vec<Alert>,
    pub repaired: usize,
}

pub struct Monitor {
    thresholds: AlertThresholds,
    history: VecDeque<Snapshot>,
}

impl Monitor {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn history(&self) -> &VecDeque<Snapshot> {
        &self.history
    }

    pub async fn run_cycle(
        &mut self,
        store: &JobStore,
        vector_store: &VectorStore,
        time_aware: &TimeAwareSearchConfig,
        weights: &ScorerWeights,
        auto_repair: bool,
    ) -> Result<CycleReport, crate::errors::DatabaseError> {
        let (total_jobs, total_matches, match_rate, avg_score, high_quality_count) = store.match_rate_stats()?;

        let snapshot = Snapshot {
            total_jobs,
            total_matches,
            match_rate,
            avg_score,
            high_quality_count,
            taken_at: chrono::Utc::now(),
        };

        let mut alerts = Vec::new();
        if snapshot.match_rate < self.thresholds.min_match_rate {
            alerts.push(Alert::LowMatchRate);
        }
        if snapshot.avg_score < self.thresholds.min_avg_score {
            alerts.push(Alert::LowAverageScore);
        }
        if total_matches > 0 && (high_quality_count as f64 / total_matches as f64) < self.thresholds.min_high_quality_ratio {
            alerts.push(Alert::LowHighQualityRatio);
        }
        if self.is_downward_trend(snapshot.match_rate) {
            alerts.push(Alert::DownwardTrend);
        }

        self.push_snapshot(snapshot.clone());

        let repaired = if auto_repair {
            match auto_repair_missing_matches(store, vector_store, time_aware, weights).await {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("auto-repair cycle failed: {}", e);
                    0
                }
            }
        } else {
            0
        };

        Ok(CycleReport { snapshot, alerts, repaired })
    }

    fn push_snapshot(&mut self, snapshot: Snapshot) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }

    fn is_downward_trend(&self, latest_rate: f64) -> bool {
        let mut rates: Vec<f64> = self.history.iter().rev().take(2).map(|s| s.match_rate).collect();
        if rates.len() < 2 {
            return false;
        }
        rates.insert(0, latest_rate);
        rates.windows(2).all(|w| w[0] < w[1])
    }

    /// Runs `run_cycle` on a fixed interval until the process is torn
    /// down; intended to be spawned as its own task by the CLI entry
    /// point.
    pub async fn run_forever(
        mut self,
        store: JobStore,
        vector_store: VectorStore,
        time_aware: TimeAwareSearchConfig,
        weights: ScorerWeights,
        auto_repair: bool,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.run_cycle(&store, &vector_store, &time_aware, &weights, auto_repair).await {
                Ok(report) => {
                    for alert in &report.alerts {
                        log::warn!("monitor alert: {}", alert);
                    }
                    log::info!(
                        "monitor cycle: {} jobs, {} matches, rate={:.2}, repaired={}",
                        report.snapshot.total_jobs,
                        report.snapshot.total_matches,
                        report.snapshot.match_rate,
                        report.repaired
                    );
                }
                Err(e) => log::error!("monitor cycle failed: {}", e),
            }
        }
    }
}

pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Fetches up to 50 embedded-but-unscored jobs and scores each against
/// the résumé registry's most recently saved profile. Skips the cycle
/// (rather than inventing a résumé) if the registry is empty.
async fn auto_repair_missing_matches(
    store: &JobStore,
    vector_store: &VectorStore,
    time_aware: &TimeAwareSearchConfig,
    weights: &ScorerWeights,
) -> Result<usize, crate::errors::DatabaseError> {
    let Some((resume_profile_id, profile_json)) = store.latest_resume_profile()? else {
        log::warn!("auto-repair skipped: no résumé profile on record");
        return Ok(0);
    };
    let resume: ResumeProfile = match serde_json::from_str(&profile_json) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("auto-repair skipped: stored résumé profile is not valid JSON: {}", e);
            return Ok(0);
        }
    };

    let job_ids = store.jobs_missing_matches(AUTO_REPAIR_BATCH)?;
    let mut repaired = 0;

    for job_id in job_ids {
        let filters = DocumentFilters {
            job_id: Some(job_id.clone()),
            ..Default::default()
        };
        let docs = match vector_store.similarity_search("", 20, Some(&filters)).await {
            Ok(docs) => docs,
            Err(_) => continue,
        };
        if docs.is_empty() {
            continue;
        }

        let job_docs: Vec<JobDocument> = docs
            .into_iter()
            .map(|d| JobDocument {
                page_content: d.page_content,
                document_type: d.document_type,
                search_score: None,
            })
            .collect();

        let job_metadata = crate::matcher::job_metadata_from_docs(store, &job_id, &job_docs);
        let result = scorer::score(&resume, &job_docs, &job_metadata, weights);

        let dims = [
            result.dimension_scores.semantic_similarity,
            result.dimension_scores.skills_match,
            result.dimension_scores.experience_match,
            result.dimension_scores.industry_match,
            result.dimension_scores.salary_match,
        ];
        let details_json = serde_json::to_string(&result).unwrap_or_default();
        let priority = format!("{:?}", result.recommendation_priority);
        let created_at = chrono::Utc::now().to_rfc3339();

        if store
            .save_resume_match(&job_id, &resume_profile_id, result.overall_score, dims, &priority, &details_json, "", &created_at)
            .is_ok()
        {
            repaired += 1;
        }
    }

    let _ = time_aware;
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downward_trend_requires_three_strictly_decreasing_snapshots() {
        let mut monitor = Monitor::new(AlertThresholds::default());
        monitor.push_snapshot(snapshot_with_rate(0.5));
        monitor.push_snapshot(snapshot_with_rate(0.4));
        assert!(monitor.is_downward_trend(0.3));
        assert!(!monitor.is_downward_trend(0.45));
    }

    #[test]
    fn history_is_bounded_to_100_snapshots() {
        let mut monitor = Monitor::new(AlertThresholds::default());
        for i in 0..150 {
            monitor.push_snapshot(snapshot_with_rate(i as f64 / 150.0));
        }
        assert_eq!(monitor.history().len(), 100);
    }

    fn snapshot_with_rate(rate: f64) -> Snapshot {
        Snapshot {
            total_jobs: 100,
            total_matches: (rate * 100.0) as i64,
            match_rate: rate,
            avg_score: 0.6,
            high_quality_count: 10,
            taken_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_cycle_reports_alerts_on_empty_store() {
        let store = JobStore::open_in_memory().unwrap();
        let vector_store = VectorStore::new(
            store.shared_conn(),
            std::sync::Arc::new(crate::vector_store::LocalEmbeddingProvider::new(32)),
            "jobs",
            "vector_db",
        );
        let mut monitor = Monitor::new(AlertThresholds::default());

        let report = monitor
            .run_cycle(&store, &vector_store, &TimeAwareSearchConfig::default(), &ScorerWeights::default(), true)
            .await
            .unwrap();

        assert_eq!(report.snapshot.total_jobs, 0);
        assert_eq!(report.repaired, 0);
    }
}
