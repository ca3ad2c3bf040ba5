//! Configuration Loader (A1): YAML configuration with `${NAME:default}`
//! environment-variable substitution, normalized into one Rust struct
//! tree regardless of which scorer-weight shape (advanced/standard/
//! legacy) the source file used.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

fn env_var_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").unwrap())
}

/// Replace every `${NAME}` / `${NAME:default}` occurrence in `raw` with
/// the named environment variable, falling back to the literal default
/// text (or the empty string) when the variable is unset.
pub fn substitute_env_vars(raw: &str) -> String {
    env_var_re()
        .replace_all(raw, |caps: &regex::Captures| {
            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub database: DatabaseConfig,
    pub websites: HashMap<String, WebsiteConfig>,
    pub selenium: SeleniumConfig,
    pub crawler: CrawlerConfig,
    pub login: LoginConfig,
    pub login_mode: LoginModeConfig,
    pub mode: ModeConfig,
    pub search: SearchConfig,
    pub selectors: SelectorsConfig,
    pub rag_system: RagSystemConfig,
    pub resume_matching: ResumeMatchingConfig,
    pub resume_matching_advanced: Option<ResumeMatchingAdvancedConfig>,
    pub time_aware_search: TimeAwareSearchConfig,

    /// Not part of the YAML surface; filled in by [`AppConfig::normalize`].
    #[serde(skip)]
    pub scorer_weights: ScorerWeights,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            database: DatabaseConfig::default(),
            websites: HashMap::new(),
            selenium: SeleniumConfig::default(),
            crawler: CrawlerConfig::default(),
            login: LoginConfig::default(),
            login_mode: LoginModeConfig::default(),
            mode: ModeConfig::default(),
            search: SearchConfig::default(),
            selectors: SelectorsConfig::default(),
            rag_system: RagSystemConfig::default(),
            resume_matching: ResumeMatchingConfig::default(),
            resume_matching_advanced: None,
            time_aware_search: TimeAwareSearchConfig::default(),
            scorer_weights: ScorerWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "jobpilot".into(),
            version: "0.1.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/jobs.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebsiteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub login_url: String,
    pub search_url: String,
    pub login_check_element: String,
    pub submit_button_selector: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SeleniumConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub page_load_timeout_secs: u64,
    pub element_wait_timeout_secs: u64,
    pub implicit_wait_secs: u64,
}

impl Default for SeleniumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            page_load_timeout_secs: 30,
            element_wait_timeout_secs: 10,
            implicit_wait_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub request_delay_ms: u64,
    pub human_simulation: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1500,
            human_simulation: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub login_url: String,
    pub wait_timeout_secs: u64,
    pub check_interval_secs: u64,
    pub success_indicators: Vec<String>,
    pub failure_indicators: Vec<String>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            wait_timeout_secs: 120,
            check_interval_secs: 2,
            success_indicators: Vec::new(),
            failure_indicators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginModeConfig {
    pub enabled: bool,
    pub max_login_attempts: u32,
    pub login_retry_delay_secs: u64,
    pub session_validation_interval_secs: i64,
    pub auto_save_session: bool,
    pub require_login_for_details: bool,
}

impl Default for LoginModeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_login_attempts: 3,
            login_retry_delay_secs: 5,
            session_validation_interval_secs: 300,
            auto_save_session: true,
            require_login_for_details: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub skip_login: bool,
    pub use_saved_session: bool,
    pub session_file: String,
    pub session_timeout_secs: i64,
    pub close_on_complete: bool,
    pub development: bool,
    pub debug: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            skip_login: false,
            use_saved_session: true,
            session_file: "data/session.json".into(),
            session_timeout_secs: crate::session::DEFAULT_SESSION_TIMEOUT_SECS,
            close_on_complete: true,
            development: false,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub job_area: String,
    pub keyword_type: String,
    pub search_type: String,
    pub current_keyword: String,
    pub keywords: SearchKeywords,
    pub strategy: SearchStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            job_area: String::new(),
            keyword_type: String::new(),
            search_type: String::new(),
            current_keyword: String::new(),
            keywords: SearchKeywords::default(),
            strategy: SearchStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchKeywords {
    pub priority_1: Vec<String>,
    pub priority_2: Vec<String>,
    pub priority_3: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchStrategy {
    pub max_pages: u32,
    pub enable_pagination: bool,
    pub page_delay_ms: u64,
    pub max_results_per_keyword: u32,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        Self {
            max_pages: 5,
            enable_pagination: true,
            page_delay_ms: 1000,
            max_results_per_keyword: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SelectorsConfig {
    pub search_page: HashMap<String, Vec<String>>,
    pub job_detail: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RagSystemConfig {
    pub vector_db: VectorDbConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    pub persist_directory: String,
    pub collection_name: String,
    pub embeddings: EmbeddingsConfig,
    pub time_aware_search: TimeAwareSearchConfig,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            persist_directory: "chroma_db".into(),
            collection_name: "jobs".into(),
            embeddings: EmbeddingsConfig::default(),
            time_aware_search: TimeAwareSearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub local_model_path: String,
    pub cloud_api_key: String,
    pub cloud_base_url: String,
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            local_model_path: String::new(),
            cloud_api_key: String::new(),
            cloud_base_url: String::new(),
            dimensions: 384,
        }
    }
}

const CLOUD_EMBEDDINGS_SECRET_KEY: &str = "jobpilot_cloud_embeddings_api_key";

impl EmbeddingsConfig {
    /// Prefers a key given directly in YAML; falls back to the OS
    /// keychain / encrypted-file secret store so a key never has to be
    /// committed in plaintext alongside the rest of the config.
    pub fn resolve_cloud_api_key(&self) -> String {
        if !self.cloud_api_key.is_empty() {
            return self.cloud_api_key.clone();
        }
        crate::secure_storage::get_secret(CLOUD_EMBEDDINGS_SECRET_KEY)
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeAwareSearchConfig {
    pub enable_time_boost: bool,
    pub fresh_data_boost: f64,
    pub fresh_data_days: i64,
    pub time_decay_factor: f64,
    pub search_strategy: String,
}

impl Default for TimeAwareSearchConfig {
    fn default() -> Self {
        Self {
            enable_time_boost: true,
            fresh_data_boost: 0.2,
            fresh_data_days: 7,
            time_decay_factor: 0.1,
            search_strategy: "hybrid".into(),
        }
    }
}

/// Legacy scorer configuration shape. Superseded by
/// `resume_matching_advanced` when present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResumeMatchingConfig {
    pub matching_threshold: f64,
    pub max_matches_per_resume: u32,
    pub algorithms: Vec<String>,
}

impl Default for ResumeMatchingConfig {
    fn default() -> Self {
        Self {
            matching_threshold: 0.5,
            max_matches_per_resume: 50,
            algorithms: vec!["semantic".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ResumeMatchingAdvancedConfig {
    pub matching_weights: MatchingWeights,
    pub match_thresholds: MatchThresholds,
    pub default_search_k: u32,
    pub max_results: u32,
    pub time_aware_matching: TimeAwareSearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingWeights {
    pub semantic: f64,
    pub skills: f64,
    pub experience: f64,
    pub industry: f64,
    pub salary: f64,
}

impl Default for MatchingWeights {
    fn default() -> Self {
        Self {
            semantic: 0.35,
            skills: 0.3,
            experience: 0.15,
            industry: 0.1,
            salary: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    pub poor: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self { poor: 0.3 }
    }
}

/// Always unit-sum, regardless of which of the three input shapes the
/// YAML used. `AppConfig::normalize` is the only place this is derived.
#[derive(Debug, Clone, Copy)]
pub struct ScorerWeights {
    pub semantic: f64,
    pub skills: f64,
    pub experience: f64,
    pub industry: f64,
    pub salary: f64,
}

impl Default for ScorerWeights {
    /// The scorer's own defaults when no `resume_matching_advanced`
    /// section is configured at all — distinct from `MatchingWeights`'s
    /// defaults, which only apply once that section is present but a
    /// particular weight is omitted.
    fn default() -> Self {
        Self {
            semantic: 0.40,
            skills: 0.45,
            experience: 0.05,
            industry: 0.02,
            salary: 0.08,
        }
    }
}

impl ScorerWeights {
    fn from_matching_weights(w: &MatchingWeights) -> Self {
        let sum = w.semantic + w.skills + w.experience + w.industry + w.salary;
        let sum = if sum <= 0.0 { 1.0 } else { sum };
        Self {
            semantic: w.semantic / sum,
            skills: w.skills / sum,
            experience: w.experience / sum,
            industry: w.industry / sum,
            salary: w.salary / sum,
        }
    }
}

impl AppConfig {
    /// Load YAML from `path`, substitute `${NAME:default}` environment
    /// references, parse, then derive `scorer_weights` so callers never
    /// branch on which of the three input shapes was present.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(raw);
        let mut config: AppConfig = serde_yaml::from_str(&substituted)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Precedence: `resume_matching_advanced.matching_weights` wins when
    /// present; otherwise `resume_matching`'s legacy fields are folded
    /// into an equivalent weight vector.
    fn normalize(&mut self) {
        self.scorer_weights = match &self.resume_matching_advanced {
            Some(advanced) => ScorerWeights::from_matching_weights(&advanced.matching_weights),
            None => ScorerWeights::default(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S8: `${NAME:default}` substitution, present and absent variable.
    #[test]
    fn s8_env_substitution_uses_default_when_unset() {
        std::env::remove_var("JOBPILOT_TEST_UNSET_VAR");
        let out = substitute_env_vars("path: ${JOBPILOT_TEST_UNSET_VAR:fallback}");
        assert_eq!(out, "path: fallback");
    }

    #[test]
    fn s8_env_substitution_prefers_set_variable() {
        std::env::set_var("JOBPILOT_TEST_SET_VAR", "from-env");
        let out = substitute_env_vars("path: ${JOBPILOT_TEST_SET_VAR:fallback}");
        assert_eq!(out, "path: from-env");
        std::env::remove_var("JOBPILOT_TEST_SET_VAR");
    }

    /// S7: advanced > standard > legacy precedence for scorer weights.
    #[test]
    fn s7_advanced_weights_take_precedence_over_legacy() {
        let yaml = r#"
resume_matching:
  matching_threshold: 0.4
resume_matching_advanced:
  matching_weights:
    semantic: 0.5
    skills: 0.5
    experience: 0.0
    industry: 0.0
    salary: 0.0
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert!((config.scorer_weights.semantic - 0.5).abs() < 1e-9);
        assert!((config.scorer_weights.skills - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scorer_weights_always_sum_to_one() {
        let config = AppConfig::default();
        let w = config.scorer_weights;
        let sum = w.semantic + w.skills + w.experience + w.industry + w.salary;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = AppConfig::load(Path::new("/nonexistent/path/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn empty_yaml_parses_to_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.selenium.headless);
        assert_eq!(config.selenium.window_size, (1920, 1080));
    }
}
