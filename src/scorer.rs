//! Scorer (C11): five-dimensional résumé-to-job match scoring. Grounded
//! on the original implementation's multi-dimensional scorer — same
//! five dimensions, same matching rules for skills, the same
//! match-level/priority/confidence derivation — re-expressed as plain
//! Rust functions over typed inputs instead of a class with mutable
//! config dicts.
//!
//! Per the crate-wide redesign note, this is the only scorer
//! implementation; there is no separate "legacy" scorer kept alongside
//! it.

use crate::config::ScorerWeights;
use crate::resume::ResumeProfile;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Default)]
pub struct JobDocument {
    pub page_content: String,
    pub document_type: String,
    pub search_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct JobMetadata {
    pub required_experience_years: Option<f64>,
    pub description: String,
    pub skills: Vec<String>,
    pub industry: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
    NotRecommended,
}

pub fn match_level(score: f64) -> MatchLevel {
    if score >= 0.85 {
        MatchLevel::Excellent
    } else if score >= 0.70 {
        MatchLevel::Good
    } else if score >= 0.50 {
        MatchLevel::Fair
    } else {
        MatchLevel::Poor
    }
}

pub fn recommendation_priority(score: f64) -> RecommendationPriority {
    if score >= 0.85 {
        RecommendationPriority::High
    } else if score >= 0.70 {
        RecommendationPriority::Medium
    } else if score >= 0.50 {
        RecommendationPriority::Low
    } else {
        RecommendationPriority::NotRecommended
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DimensionScores {
    pub semantic_similarity: f64,
    pub skills_match: f64,
    pub experience_match: f64,
    pub industry_match: f64,
    pub salary_match: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MatchAnalysis {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub skill_gap_score: f64,
    pub experience_alignment: f64,
    pub industry_fit: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub overall_score: f64,
    pub dimension_scores: DimensionScores,
    pub match_level: MatchLevel,
    pub recommendation_priority: RecommendationPriority,
    pub confidence_level: f64,
    pub analysis: MatchAnalysis,
}

/// `job_area`/canonical CN↔EN synonym lattice for skill matching.
/// Crate-level defaults, not sourced from config — mirrors the
/// original's module-level skill-weight dictionary.
fn skill_synonyms() -> &'static [(&'static str, &'static str)] {
    &[
        ("机器学习", "machine learning"),
        ("深度学习", "deep learning"),
        ("人工智能", "artificial intelligence"),
        ("数据科学", "data science"),
        ("大数据", "big data"),
        ("数据工程", "data engineering"),
        ("数据架构", "data architecture"),
        ("数据治理", "data governance"),
        ("云计算", "cloud computing"),
        ("敏捷开发", "agile"),
        ("项目管理", "project management"),
        ("计算机视觉", "computer vision"),
    ]
}

/// A skill on the left is considered satisfied by any variant on the
/// right (e.g. a job asking for "azure data factory" is satisfied by a
/// résumé listing the umbrella skill "azure").
fn skill_variants() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        (
            "azure",
            &[
                "azure data factory",
                "azure functions",
                "azure storage",
                "azure databricks",
                "azure synapse",
                "azure devops",
                "azure app service",
                "microsoft azure",
            ],
        ),
        ("aws", &["aws lambda", "amazon web services"]),
        ("spark", &["pyspark", "spark sql"]),
        ("python", &["pyspark"]),
    ]
}

/// (skill, bonus) — résumé-side skills that earn a small bonus when
/// absent from the job's extracted skill list, tiered by value.
fn high_value_skills() -> &'static [(&'static str, f64)] {
    &[
        ("machine learning", 0.08),
        ("深度学习", 0.08),
        ("deep learning", 0.08),
        ("data architecture", 0.06),
        ("数据架构", 0.06),
        ("kubernetes", 0.04),
        ("agile", 0.04),
    ]
}

fn skill_weight(skill: &str) -> f64 {
    const WEIGHTS: &[(&str, f64)] = &[
        ("python", 1.8),
        ("azure", 1.9),
        ("azure data factory", 2.0),
        ("azure databricks", 2.0),
        ("databricks", 2.0),
        ("machine learning", 1.9),
        ("深度学习", 1.8),
        ("pyspark", 1.9),
        ("etl", 1.8),
        ("kubernetes", 1.6),
        ("agile", 1.7),
    ];
    WEIGHTS
        .iter()
        .find(|(name, _)| *name == skill)
        .map(|(_, w)| *w)
        .unwrap_or(1.0)
}

/// Relations between an industry and categories considered adjacent
/// enough to warrant partial credit.
fn industry_category_relations() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("healthcare", &["制药", "pharmaceutical", "medical", "医疗"]),
        ("科技", &["互联网", "ai", "软件", "技术", "technology", "software"]),
        ("finance", &["金融", "banking", "fintech"]),
    ]
}

fn is_matched(job_skill: &str, resume_skills: &[String]) -> bool {
    let j = job_skill.to_lowercase();
    if resume_skills.iter().any(|r| r.to_lowercase() == j) {
        return true;
    }
    for (cn, en) in skill_synonyms() {
        let (cn, en) = (cn.to_lowercase(), en.to_lowercase());
        if (j == cn || j == en)
            && resume_skills.iter().any(|r| {
                let r = r.to_lowercase();
                r == cn || r == en
            })
        {
            return true;
        }
    }
    for (base, variants) in skill_variants() {
        let base = base.to_lowercase();
        if variants.iter().any(|v| v.to_lowercase() == j) && resume_skills.iter().any(|r| r.to_lowercase() == base) {
            return true;
        }
        if base == j && resume_skills.iter().any(|r| variants.iter().any(|v| v.to_lowercase() == r.to_lowercase())) {
            return true;
        }
    }
    for r in resume_skills {
        let r = r.to_lowercase();
        if r.len() >= 3 && (j.contains(&r) || r.contains(&j)) {
            return true;
        }
    }
    let j_tokens: Vec<&str> = job_skill.split_whitespace().collect();
    if j_tokens.len() >= 2 {
        for r in resume_skills {
            let r_tokens: Vec<&str> = r.split_whitespace().collect();
            if r_tokens.len() >= 2 {
                let common = j_tokens.iter().filter(|t| r_tokens.iter().any(|rt| rt.eq_ignore_ascii_case(t))).count();
                let smaller = j_tokens.len().min(r_tokens.len());
                if common >= 2 && (common as f64 / smaller as f64) >= 0.5 {
                    return true;
                }
            }
        }
    }
    false
}

fn score_semantic_similarity(docs: &[JobDocument]) -> f64 {
    let with_scores: Vec<&JobDocument> = docs.iter().filter(|d| d.search_score.is_some()).collect();
    if !with_scores.is_empty() {
        if with_scores.len() == 1 {
            return with_scores[0].search_score.unwrap();
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for doc in &with_scores {
            let s = doc.search_score.unwrap();
            let w = s.max(0.0).powf(1.2);
            weighted_sum += s * w;
            weight_total += w;
        }
        return if weight_total > 0.0 { weighted_sum / weight_total } else { 0.5 };
    }

    if docs.is_empty() {
        return 0.5;
    }
    let total: f64 = docs
        .iter()
        .map(|doc| {
            let mut base = match doc.document_type.as_str() {
                "overview" => 0.8,
                "skills" => 0.85,
                "responsibility" => 0.7,
                "requirement" => 0.75,
                "basic_requirements" => 0.6,
                "company_info" => 0.4,
                _ => 0.5,
            };
            let len = doc.page_content.chars().count();
            if len >= 500 {
                base += 0.1;
            } else if len >= 200 {
                base += 0.05;
            }
            base.min(1.0)
        })
        .sum();
    total / docs.len() as f64
}

struct SkillsResult {
    score: f64,
    matched: Vec<String>,
    missing: Vec<String>,
}

fn score_skills(resume: &ResumeProfile, job_skills: &[String]) -> SkillsResult {
    if job_skills.is_empty() {
        return SkillsResult {
            score: 0.5,
            matched: Vec::new(),
            missing: Vec::new(),
        };
    }

    let resume_skills: Vec<String> = resume.get_all_skills().iter().map(|s| s.to_lowercase()).collect();

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for skill in job_skills {
        let w = skill_weight(&skill.to_lowercase());
        weight_total += w;
        if is_matched(skill, &resume_skills) {
            weighted_sum += w;
            matched.push(skill.clone());
        } else {
            missing.push(skill.clone());
        }
    }

    let mut score = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };

    let job_skills_lower: Vec<String> = job_skills.iter().map(|s| s.to_lowercase()).collect();
    let mut bonus = 0.0;
    for resume_skill in &resume_skills {
        if job_skills_lower.contains(resume_skill) {
            continue;
        }
        if let Some((_, increment)) = high_value_skills().iter().find(|(s, _)| s.to_lowercase() == *resume_skill) {
            bonus += increment;
        }
    }
    bonus = bonus.min(0.25);
    score = (score + bonus).min(1.0);

    SkillsResult { score, matched, missing }
}

fn score_experience(required_years: Option<f64>, have_years: f64) -> f64 {
    match required_years {
        None => 0.9,
        Some(req) if req <= 0.0 => 0.9,
        Some(req) => {
            if have_years >= req {
                if have_years <= 2.0 * req {
                    1.0
                } else {
                    0.95
                }
            } else {
                have_years / req
            }
        }
    }
}

fn score_industry(job_industry: Option<&str>, resume: &ResumeProfile) -> f64 {
    let Some(job_industry) = job_industry else {
        return 0.7;
    };
    let job_lower = job_industry.to_lowercase();

    for (resume_industry, weight) in &resume.industry_experience {
        let r = resume_industry.to_lowercase();
        if job_lower.contains(&r) || r.contains(&job_lower) {
            return *weight;
        }
    }

    for (category, related) in industry_category_relations() {
        let category_match = category.to_lowercase() == job_lower;
        let related_hits = related.iter().any(|rel| {
            resume
                .industry_experience
                .keys()
                .any(|k| k.to_lowercase() == rel.to_lowercase())
        });
        if category_match && related_hits {
            return 0.6;
        }
        if related.iter().any(|rel| rel.to_lowercase() == job_lower) {
            let related_resume_hit = resume
                .industry_experience
                .keys()
                .any(|k| related.iter().any(|rel| rel.to_lowercase() == k.to_lowercase()));
            if related_resume_hit {
                return 0.6;
            }
        }
    }

    0.0
}

fn score_salary(resume: &ResumeProfile, job_min: Option<i64>, job_max: Option<i64>) -> f64 {
    let r_min = resume.expected_salary_range.min;
    let r_max = resume.expected_salary_range.max;
    if r_min == 0 && r_max == 0 {
        return 0.8;
    }
    let Some(j_min) = job_min else { return 0.8 };
    let j_max = job_max.unwrap_or(i64::MAX);

    if r_max <= (j_min as f64 * 1.2) as i64 {
        return 0.9;
    }

    let overlap_start = r_min.max(j_min);
    let overlap_end = if j_max == i64::MAX { r_max } else { r_max.min(j_max) };
    let overlap = (overlap_end - overlap_start).max(0);

    if overlap > 0 {
        let r_range = (r_max - r_min).max(1) as f64;
        let j_range = if j_max == i64::MAX { r_range } else { (j_max - j_min).max(1) as f64 };
        return (overlap as f64 / r_range.min(j_range)).min(1.0);
    }

    let r_mid = (r_min + r_max) as f64 / 2.0;
    let j_mid = if j_max == i64::MAX { j_min as f64 } else { (j_min + j_max) as f64 / 2.0 };
    if j_mid == 0.0 {
        return 0.8;
    }
    let gap_ratio = (r_mid - j_mid).abs() / j_mid;
    if gap_ratio <= 0.2 {
        0.8
    } else if gap_ratio <= 0.4 {
        0.6
    } else if gap_ratio <= 0.6 {
        0.4
    } else {
        0.2
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn build_analysis(dims: &DimensionScores, matched: Vec<String>, missing: Vec<String>) -> MatchAnalysis {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut recommendations = Vec::new();

    if dims.skills_match >= 0.8 {
        strengths.push("strong skill overlap with job requirements".to_string());
    } else if dims.skills_match < 0.5 {
        weaknesses.push("limited skill overlap with job requirements".to_string());
        recommendations.push("highlight or acquire the missing skills before applying".to_string());
    }

    if dims.experience_match >= 0.9 {
        strengths.push("experience level closely matches requirements".to_string());
    } else if dims.experience_match < 0.6 {
        weaknesses.push("experience below the role's stated requirement".to_string());
    }

    if dims.industry_match >= 0.6 {
        strengths.push("relevant industry background".to_string());
    } else if dims.industry_match == 0.0 {
        weaknesses.push("no recorded experience in this industry".to_string());
    }

    if dims.salary_match < 0.5 {
        recommendations.push("salary expectations may not align with this role".to_string());
    }

    MatchAnalysis {
        strengths,
        weaknesses,
        recommendations,
        matched_skills: matched,
        missing_skills: missing,
        skill_gap_score: dims.skills_match,
        experience_alignment: dims.experience_match,
        industry_fit: dims.industry_match,
    }
}

pub fn score(resume: &ResumeProfile, docs: &[JobDocument], job: &JobMetadata, weights: &ScorerWeights) -> MatchResult {
    let semantic_similarity = score_semantic_similarity(docs);
    let skills_result = score_skills(resume, &job.skills);

    let required_years = job.required_experience_years.or_else(|| parse_required_years(&job.description));
    let experience_match = score_experience(required_years, resume.total_experience_years as f64);

    let industry_match = score_industry(job.industry.as_deref(), resume);
    let salary_match = score_salary(resume, job.salary_min, job.salary_max);

    let dims = DimensionScores {
        semantic_similarity,
        skills_match: skills_result.score,
        experience_match,
        industry_match,
        salary_match,
    };

    let overall = dims.semantic_similarity * weights.semantic
        + dims.skills_match * weights.skills
        + dims.experience_match * weights.experience
        + dims.industry_match * weights.industry
        + dims.salary_match * weights.salary;

    let confidence = (1.0
        - variance(&[
            dims.semantic_similarity,
            dims.skills_match,
            dims.experience_match,
            dims.industry_match,
            dims.salary_match,
        ]))
    .max(0.5);

    let analysis = build_analysis(&dims, skills_result.matched, skills_result.missing);

    MatchResult {
        overall_score: overall,
        match_level: match_level(overall),
        recommendation_priority: recommendation_priority(overall),
        confidence_level: confidence,
        dimension_scores: dims,
        analysis,
    }
}

/// Same regex keyword families the original scorer scans job text with,
/// grouped the same way (languages, platforms, ML frameworks, domains,
/// process/tooling). Matches feed `score_skills` the same way résumé
/// skills do.
fn skill_keyword_patterns() -> &'static [&'static str] {
    &[
        r"\b(python|java|javascript|c#|c\+\+|sql|r|scala|go|rust)\b",
        r"\b(azure|aws|gcp|docker|kubernetes|spark|hadoop|kafka)\b",
        r"\b(tensorflow|pytorch|scikit-learn|pandas|numpy)\b",
        r"\b(machine learning|deep learning|ai|artificial intelligence)\b",
        r"\b(data science|data engineering|data analysis|big data)\b",
        r"\b(scrum|agile|devops|ci/cd|git|jenkins)\b",
    ]
}

/// Extracts a job's implied skill list from its free-text description
/// and requirements by scanning for the same keyword families the
/// original scorer used, deduplicated and lowercased.
pub fn extract_skills_from_text(text: &str) -> Vec<String> {
    static PATTERNS: std::sync::OnceLock<Vec<regex::Regex>> = std::sync::OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        skill_keyword_patterns()
            .iter()
            .map(|p| regex::Regex::new(p).unwrap())
            .collect()
    });

    let lower = text.to_lowercase();
    let mut skills: Vec<String> = Vec::new();
    for re in patterns {
        for caps in re.captures_iter(&lower) {
            if let Some(m) = caps.get(1) {
                let skill = m.as_str().to_string();
                if !skills.contains(&skill) {
                    skills.push(skill);
                }
            }
        }
    }
    skills
}

/// Parses a free-text salary string (e.g. "20k-40k", "20,000-40,000",
/// "面议") into a numeric `(min, max)` range. `k`/`w` suffixes scale by
/// 1,000/10,000 the way the job board's own listings abbreviate pay. A
/// single figure with no range is treated as both ends; unparseable
/// text (negotiable, empty) yields `(None, None)` so the scorer falls
/// back to its neutral default.
pub fn parse_salary_range(salary: &str) -> (Option<i64>, Option<i64>) {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| regex::Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(k|w)?").unwrap());

    let cleaned: String = salary.chars().filter(|c| *c != ',').collect();
    let mut figures = Vec::new();
    for caps in re.captures_iter(&cleaned) {
        let Some(num) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
            continue;
        };
        let scale = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
            Some(s) if s == "w" => 10_000.0,
            Some(s) if s == "k" => 1_000.0,
            _ => 1.0,
        };
        figures.push((num * scale) as i64);
    }

    match figures.len() {
        0 => (None, None),
        1 => (Some(figures[0]), Some(figures[0])),
        _ => (Some(figures[0].min(figures[1])), Some(figures[0].max(figures[1]))),
    }
}

/// Regex-parses `/(\d+)\+?\s*years?\s*of?\s*experience/` and its
/// Chinese equivalent `/(\d+)\+?\s*年.*经验/` out of a job description.
fn parse_required_years(description: &str) -> Option<f64> {
    static RE_EN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static RE_CN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let re_en = RE_EN.get_or_init(|| regex::Regex::new(r"(\d+)\+?\s*years?\s*of?\s*experience").unwrap());
    let re_cn = RE_CN.get_or_init(|| regex::Regex::new(r"(\d+)\+?\s*年.*经验").unwrap());

    re_en
        .captures(description)
        .or_else(|| re_cn.captures(description))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::SalaryRange;
    use std::collections::HashMap;

    fn worked_example_resume() -> ResumeProfile {
        let mut resume = ResumeProfile::new("Candidate");
        resume.total_experience_years = 20;
        resume.add_skill_category(
            "core_skills",
            vec!["Python".into(), "Databricks".into(), "Azure".into(), "机器学习".into()],
            "advanced",
        );
        resume.expected_salary_range = SalaryRange { min: 300_000, max: 500_000 };
        resume.industry_experience = HashMap::from([("制药".to_string(), 0.64)]);
        resume
    }

    fn worked_example_job() -> (Vec<JobDocument>, JobMetadata) {
        let docs = vec![JobDocument {
            page_content: "overview text".into(),
            document_type: "overview".into(),
            search_score: Some(0.6),
        }];
        let job = JobMetadata {
            required_experience_years: Some(8.0),
            description: String::new(),
            skills: vec!["python".into(), "databricks".into(), "azure data factory".into()],
            industry: Some("Healthcare".into()),
            salary_min: Some(400_000),
            salary_max: Some(600_000),
        };
        (docs, job)
    }

    #[test]
    fn s6_scorer_end_to_end_matches_worked_example() {
        let resume = worked_example_resume();
        let (docs, job) = worked_example_job();
        let weights = ScorerWeights::default();

        let result = score(&resume, &docs, &job, &weights);

        assert!((result.dimension_scores.semantic_similarity - 0.6).abs() < 1e-9);
        assert!(result.dimension_scores.skills_match >= 0.95);
        assert!((result.dimension_scores.experience_match - 0.95).abs() < 1e-9);
        assert!((result.dimension_scores.industry_match - 0.6).abs() < 1e-9);
        assert!((result.dimension_scores.salary_match - 0.5).abs() < 1e-9);
        assert!((result.overall_score - 0.79).abs() < 0.02, "overall={}", result.overall_score);
        assert_eq!(result.match_level, MatchLevel::Good);
    }

    #[test]
    fn empty_job_skills_yields_neutral_skill_score() {
        let resume = worked_example_resume();
        let result = score_skills(&resume, &[]);
        assert_eq!(result.score, 0.5);
    }

    #[test]
    fn experience_over_double_required_is_penalized_slightly() {
        assert_eq!(score_experience(Some(5.0), 20.0), 0.95);
        assert_eq!(score_experience(Some(5.0), 8.0), 1.0);
        assert_eq!(score_experience(Some(10.0), 5.0), 0.5);
        assert_eq!(score_experience(None, 10.0), 0.9);
    }

    #[test]
    fn match_level_thresholds_are_inclusive_at_boundaries() {
        assert_eq!(match_level(0.85), MatchLevel::Excellent);
        assert_eq!(match_level(0.70), MatchLevel::Good);
        assert_eq!(match_level(0.50), MatchLevel::Fair);
        assert_eq!(match_level(0.49), MatchLevel::Poor);
    }

    #[test]
    fn extract_skills_from_text_finds_known_keywords() {
        let skills = extract_skills_from_text("Looking for a Rust/Python engineer with Kubernetes and AWS experience.");
        assert!(skills.contains(&"rust".to_string()));
        assert!(skills.contains(&"python".to_string()));
        assert!(skills.contains(&"kubernetes".to_string()));
        assert!(skills.contains(&"aws".to_string()));
    }

    #[test]
    fn extract_skills_from_text_dedupes_and_ignores_unknown_words() {
        let skills = extract_skills_from_text("python python python gardening");
        assert_eq!(skills, vec!["python".to_string()]);
    }

    #[test]
    fn parse_salary_range_handles_k_suffixed_range() {
        assert_eq!(parse_salary_range("20k-40k"), (Some(20_000), Some(40_000)));
    }

    #[test]
    fn parse_salary_range_handles_comma_thousands() {
        assert_eq!(parse_salary_range("20,000-40,000"), (Some(20_000), Some(40_000)));
    }

    #[test]
    fn parse_salary_range_single_figure_is_both_ends() {
        assert_eq!(parse_salary_range("50k"), (Some(50_000), Some(50_000)));
    }

    #[test]
    fn parse_salary_range_negotiable_text_yields_none() {
        assert_eq!(parse_salary_range("面议"), (None, None));
        assert_eq!(parse_salary_range(""), (None, None));
    }
}
