//! Résumé Model (C10): a pure data type with no I/O of its own.
//! `serde`-derived the way every other persisted struct in this crate
//! is, so serialize/deserialize to a canonical mapping comes for free
//! through `serde_json::Value` rather than a hand-written `to_dict`.
//!
//! Grounded on the original implementation's generic résumé model:
//! arbitrary skill categories instead of a fixed schema, industry
//! experience tracked as prior weights (not years), and a free-form
//! `profile_type` tag distinguishing legacy-imported résumés from
//! native ones.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillCategory {
    pub category_name: String,
    pub skills: Vec<String>,
    #[serde(default = "default_proficiency")]
    pub proficiency_level: String,
    pub years_experience: Option<u32>,
}

fn default_proficiency() -> String {
    "intermediate".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkExperience {
    pub company: String,
    pub position: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duration_years: f64,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub industry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Education {
    pub degree: String,
    pub major: String,
    pub university: String,
    pub graduation_year: String,
    pub gpa: Option<f64>,
    #[serde(default)]
    pub honors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Project {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub duration: String,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub role: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SalaryRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResumeProfile {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub total_experience_years: u32,
    #[serde(default)]
    pub current_position: String,
    #[serde(default)]
    pub current_company: String,

    #[serde(default)]
    pub skill_categories: Vec<SkillCategory>,
    #[serde(default)]
    pub work_history: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub languages: Vec<HashMap<String, String>>,

    /// Prior weights in `[0, 1]`, not years worked. Use
    /// `calculate_industry_experience_years` for the latter.
    #[serde(default)]
    pub industry_experience: HashMap<String, f64>,

    #[serde(default)]
    pub preferred_positions: Vec<String>,
    #[serde(default)]
    pub expected_salary_range: SalaryRange,
    #[serde(default)]
    pub career_objectives: Vec<String>,
    #[serde(default)]
    pub soft_skills: Vec<String>,
    #[serde(default)]
    pub personality_traits: Vec<String>,

    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_profile_type")]
    pub profile_type: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_profile_type() -> String {
    "generic".to_string()
}

impl ResumeProfile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
            version: default_version(),
            profile_type: default_profile_type(),
            ..Default::default()
        }
    }

    /// Concatenates skill lists across categories preserving insertion
    /// order.
    pub fn get_all_skills(&self) -> Vec<String> {
        self.skill_categories
            .iter()
            .flat_map(|cat| cat.skills.iter().cloned())
            .collect()
    }

    pub fn get_skills_by_category(&self, category_name: &str) -> Vec<String> {
        self.skill_categories
            .iter()
            .find(|cat| cat.category_name.eq_ignore_ascii_case(category_name))
            .map(|cat| cat.skills.clone())
            .unwrap_or_default()
    }

    pub fn add_skill_category(&mut self, category_name: impl Into<String>, skills: Vec<String>, proficiency_level: impl Into<String>) {
        self.skill_categories.push(SkillCategory {
            category_name: category_name.into(),
            skills,
            proficiency_level: proficiency_level.into(),
            years_experience: None,
        });
    }

    pub fn add_work_experience(&mut self, experience: WorkExperience) {
        self.work_history.push(experience);
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn get_experience_by_industry(&self, industry: &str) -> Vec<&WorkExperience> {
        self.work_history
            .iter()
            .filter(|exp| exp.industry.eq_ignore_ascii_case(industry))
            .collect()
    }

    /// Sums `duration_years` per industry across work history. Distinct
    /// from `industry_experience`, which holds prior weights, not years.
    pub fn calculate_industry_experience_years(&self) -> HashMap<String, f64> {
        let mut years: HashMap<String, f64> = HashMap::new();
        for exp in &self.work_history {
            if !exp.industry.is_empty() {
                *years.entry(exp.industry.clone()).or_insert(0.0) += exp.duration_years;
            }
        }
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> ResumeProfile {
        let mut profile = ResumeProfile::new("Test Candidate");
        profile.add_skill_category("core_skills", vec!["rust".into(), "sqlite".into()], "advanced");
        profile.add_skill_category("cloud", vec!["aws".into()], "intermediate");
        profile.add_work_experience(WorkExperience {
            company: "Acme".into(),
            position: "Engineer".into(),
            start_date: "2019-01".into(),
            end_date: Some("2021-01".into()),
            duration_years: 2.0,
            industry: "IT".into(),
            ..Default::default()
        });
        profile.add_work_experience(WorkExperience {
            company: "Beta".into(),
            position: "Senior Engineer".into(),
            start_date: "2021-01".into(),
            end_date: None,
            duration_years: 3.0,
            industry: "IT".into(),
            ..Default::default()
        });
        profile
    }

    #[test]
    fn get_all_skills_preserves_category_order() {
        let profile = sample_profile();
        assert_eq!(profile.get_all_skills(), vec!["rust", "sqlite", "aws"]);
    }

    #[test]
    fn industry_experience_years_sums_across_jobs_in_same_industry() {
        let profile = sample_profile();
        let years = profile.calculate_industry_experience_years();
        assert_eq!(years.get("IT"), Some(&5.0));
    }

    #[test]
    fn get_skills_by_category_is_case_insensitive() {
        let profile = sample_profile();
        assert_eq!(profile.get_skills_by_category("CLOUD"), vec!["aws"]);
        assert!(profile.get_skills_by_category("missing").is_empty());
    }

    #[test]
    fn serde_round_trips_through_json() {
        let profile = sample_profile();
        let json = serde_json::to_string(&profile).unwrap();
        let restored: ResumeProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get_all_skills(), profile.get_all_skills());
        assert_eq!(restored.work_history.len(), 2);
    }
}
