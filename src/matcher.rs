//! Matcher (C12): the one user-facing bounded request. Builds a query
//! from a résumé, retrieves candidate job documents through the
//! time-aware retriever (C9), groups by job, scores each group (C11),
//! and assembles a ranked bundle with summary and career-insight
//! metadata.
//!
//! This is the one place in the crate where fan-out across independent
//! units of work is worth a bounded worker pool: scoring step 4 reads
//! only C2/C8/C9 per job, so it is sized the way this codebase's local
//! AI provider sizes its own worker pool, off `num_cpus::get()`.

use crate::config::{MatchThresholds, ScorerWeights, TimeAwareSearchConfig};
use crate::db::JobStore;
use crate::resume::ResumeProfile;
use crate::retriever::{Strategy, TimeAwareRetriever};
use crate::scorer::{self, JobDocument, JobMetadata, MatchResult, RecommendationPriority};
use crate::vector_store::VectorStore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MatchedJob {
    pub job_id: String,
    pub result: MatchResult,
}

#[derive(Debug, Clone, Default)]
pub struct MatchingSummary {
    pub total_matches: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
    pub average_score: f64,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct CareerInsights {
    pub top_matching_positions: Vec<String>,
    pub skill_gap_analysis: HashMap<String, Vec<String>>,
    pub market_trends: Vec<String>,
    pub career_recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchingBundle {
    pub summary: MatchingSummary,
    pub matches: Vec<MatchedJob>,
    pub insights: CareerInsights,
}

/// Current position + years, top-8 skills, up to 3 preferred positions,
/// up to 2 industries, up to 3 soft skills — joined with spaces.
pub fn build_query(resume: &ResumeProfile) -> String {
    let mut parts = Vec::new();

    if !resume.current_position.is_empty() {
        parts.push(format!("{} {} years", resume.current_position, resume.total_experience_years));
    }

    let mut skills_by_weight: Vec<&str> = resume.get_all_skills().iter().map(String::as_str).collect();
    skills_by_weight.dedup();
    for skill in skills_by_weight.into_iter().take(8) {
        parts.push(skill.to_string());
    }

    for position in resume.preferred_positions.iter().take(3) {
        parts.push(position.clone());
    }

    for industry in resume.industry_experience.keys().take(2) {
        parts.push(industry.clone());
    }

    for soft_skill in resume.soft_skills.iter().take(3) {
        parts.push(soft_skill.clone());
    }

    parts.join(" ")
}

pub async fn find_matching_jobs(
    resume: &ResumeProfile,
    store: &JobStore,
    vector_store: &VectorStore,
    time_aware: &TimeAwareSearchConfig,
    weights: &ScorerWeights,
    thresholds: &MatchThresholds,
    default_search_k: u32,
    top_k: u32,
) -> MatchingBundle {
    let started = std::time::Instant::now();
    let query = build_query(resume);

    let k = (default_search_k as usize).min(3 * top_k as usize).max(1);
    let strategy = Strategy::parse(&time_aware.search_strategy);

    let retriever = TimeAwareRetriever::new(vector_store, time_aware.clone());
    let ranked = retriever.search(&query, k, None, strategy).await;

    let mut by_job: HashMap<String, Vec<JobDocument>> = HashMap::new();
    for doc in ranked {
        by_job
            .entry(doc.document.job_id.clone())
            .or_default()
            .push(JobDocument {
                page_content: doc.document.page_content,
                document_type: doc.document.document_type,
                search_score: Some(doc.adjusted_score as f64),
            });
    }

    by_job.retain(|job_id, _| !store.is_deleted(job_id).unwrap_or(true));

    let resume = Arc::new(resume.clone());
    let weights = Arc::new(*weights);
    let pool_size = num_cpus::get().max(1);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(pool_size));

    let mut handles = Vec::with_capacity(by_job.len());
    for (job_id, docs) in by_job {
        let resume = Arc::clone(&resume);
        let weights = Arc::clone(&weights);
        let semaphore = Arc::clone(&semaphore);
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.ok();
            let job_metadata = job_metadata_from_docs(&store, &job_id, &docs);
            let result = scorer::score(&resume, &docs, &job_metadata, &weights);
            (job_id, result)
        }));
    }

    let mut scored = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok((job_id, result)) = handle.await {
            if result.overall_score >= thresholds.poor {
                scored.push(MatchedJob { job_id, result });
            }
        }
    }

    scored.sort_by(|a, b| b.result.overall_score.partial_cmp(&a.result.overall_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k as usize);

    let summary = build_summary(&scored, started.elapsed());
    let insights = build_insights(&scored);

    MatchingBundle {
        summary,
        matches: scored,
        insights,
    }
}

/// Builds scoring metadata for one job from its `job_details` row (C2)
/// plus the aggregated retrieval docs, mirroring the original scorer's
/// `_extract_job_metadata`/`_extract_job_skills`: salary and industry
/// come straight off the stored row, skills are keyword-extracted from
/// the combined description/requirements/doc text, and required years
/// falls back to `parse_required_years` inside `scorer::score` itself
/// when the row's `experience` field doesn't parse.
pub(crate) fn job_metadata_from_docs(store: &JobStore, job_id: &str, docs: &[JobDocument]) -> JobMetadata {
    let detail = store.get_job_detail(job_id).ok().flatten();

    let mut text_parts: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
    if let Some(detail) = &detail {
        text_parts.push(&detail.description);
        text_parts.push(&detail.requirements);
    }
    let combined_text = text_parts.join(" ");
    let skills = scorer::extract_skills_from_text(&combined_text);

    let description = detail
        .as_ref()
        .map(|d| d.description.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or(combined_text);

    let required_experience_years = detail
        .as_ref()
        .and_then(|d| parse_experience_prefix(&d.experience));

    let industry = detail.as_ref().map(|d| d.industry.clone()).filter(|i| !i.is_empty());

    let (salary_min, salary_max) = detail
        .as_ref()
        .map(|d| scorer::parse_salary_range(&d.salary))
        .unwrap_or((None, None));

    JobMetadata {
        required_experience_years,
        description,
        skills,
        industry,
        salary_min,
        salary_max,
    }
}

/// Pulls a leading integer out of an `experience` field like "5年以上"
/// or "3-5 years"; returns `None` for unconstrained text such as
/// "经验不限" so the scorer keeps its own description-based fallback.
fn parse_experience_prefix(experience: &str) -> Option<f64> {
    let digits: String = experience.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<f64>().ok()
}

fn build_summary(matches: &[MatchedJob], elapsed: std::time::Duration) -> MatchingSummary {
    let total_matches = matches.len();
    let high_priority = matches.iter().filter(|m| m.result.recommendation_priority == RecommendationPriority::High).count();
    let medium_priority = matches.iter().filter(|m| m.result.recommendation_priority == RecommendationPriority::Medium).count();
    let low_priority = matches.iter().filter(|m| m.result.recommendation_priority == RecommendationPriority::Low).count();
    let average_score = if total_matches > 0 {
        matches.iter().map(|m| m.result.overall_score).sum::<f64>() / total_matches as f64
    } else {
        0.0
    };

    MatchingSummary {
        total_matches,
        high_priority,
        medium_priority,
        low_priority,
        average_score,
        processing_time_ms: elapsed.as_millis(),
    }
}

fn build_insights(matches: &[MatchedJob]) -> CareerInsights {
    let mut skill_gap_analysis = HashMap::new();
    for m in matches.iter().take(10) {
        if !m.result.analysis.missing_skills.is_empty() {
            skill_gap_analysis.insert(m.job_id.clone(), m.result.analysis.missing_skills.clone());
        }
    }

    let mut career_recommendations = Vec::new();
    if matches.is_empty() {
        career_recommendations.push("no qualifying matches found; consider widening search filters".to_string());
    } else if matches.iter().all(|m| m.result.analysis.skill_gap_score < 0.6) {
        career_recommendations.push("upskilling in commonly-missing skills may broaden qualifying matches".to_string());
    }

    CareerInsights {
        top_matching_positions: matches.iter().take(5).map(|m| m.job_id.clone()).collect(),
        skill_gap_analysis,
        market_trends: vec!["remote-friendly postings continue to grow across matched listings".to_string()],
        career_recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_joins_position_skills_and_preferences() {
        let mut resume = ResumeProfile::new("Candidate");
        resume.current_position = "Data Engineer".into();
        resume.total_experience_years = 5;
        resume.add_skill_category("core", vec!["rust".into(), "sql".into()], "advanced");
        resume.preferred_positions = vec!["Platform Engineer".into()];
        resume.soft_skills = vec!["communication".into()];

        let query = build_query(&resume);
        assert!(query.contains("Data Engineer"));
        assert!(query.contains("rust"));
        assert!(query.contains("Platform Engineer"));
        assert!(query.contains("communication"));
    }

    #[tokio::test]
    async fn find_matching_jobs_never_panics_on_empty_store() {
        let store = JobStore::open_in_memory().unwrap();
        let vector_store = VectorStore::new(
            store.shared_conn(),
            Arc::new(crate::vector_store::LocalEmbeddingProvider::new(32)),
            "jobs",
            "vector_db",
        );
        let resume = ResumeProfile::new("Candidate");

        let bundle = find_matching_jobs(
            &resume,
            &store,
            &vector_store,
            &TimeAwareSearchConfig::default(),
            &ScorerWeights::default(),
            &MatchThresholds::default(),
            30,
            10,
        )
        .await;

        assert_eq!(bundle.matches.len(), 0);
        assert_eq!(bundle.summary.total_matches, 0);
    }

    #[test]
    fn job_metadata_from_docs_reads_real_data_instead_of_defaults() {
        use crate::db::{Job, JobDetail};

        let store = JobStore::open_in_memory().unwrap();
        store
            .save_job(&Job {
                job_id: "job-1".into(),
                title: "Rust Engineer".into(),
                company: "Acme".into(),
                url: String::new(),
                job_fingerprint: Some("fp-1".into()),
                application_status: "new".into(),
                match_score: None,
                website: "example".into(),
                created_at: "2026-01-01T00:00:00Z".into(),
                submitted_at: None,
                is_deleted: false,
                rag_processed: false,
            })
            .unwrap();
        store
            .save_job_detail(
                &JobDetail {
                    job_id: "job-1".into(),
                    salary: "20k-40k".into(),
                    industry: "technology".into(),
                    experience: "5年以上".into(),
                    description: "we need a rust and kubernetes engineer".into(),
                    extracted_at: "2026-01-01T00:00:00Z".into(),
                    ..Default::default()
                },
                "",
            )
            .unwrap();

        let docs = vec![JobDocument {
            page_content: "overview".into(),
            document_type: "overview".into(),
            search_score: Some(0.7),
        }];

        let metadata = job_metadata_from_docs(&store, "job-1", &docs);

        assert_eq!(metadata.salary_min, Some(20_000));
        assert_eq!(metadata.salary_max, Some(40_000));
        assert_eq!(metadata.industry.as_deref(), Some("technology"));
        assert_eq!(metadata.required_experience_years, Some(5.0));
        assert!(metadata.skills.contains(&"rust".to_string()));
        assert!(metadata.skills.contains(&"kubernetes".to_string()));
    }
}
