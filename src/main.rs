//! CLI entry point (A4): a single `clap`-derived dispatcher over the
//! pipeline's public operations. No GUI shell, no Tauri IPC surface —
//! every subcommand opens its own stores, does one thing, and exits.

use clap::{Parser, Subcommand};
use jobpilot::config::AppConfig;
use jobpilot::db::JobStore;
use jobpilot::errors::{to_user_message, CrateError, IoError};
use jobpilot::matcher;
use jobpilot::monitor::{AlertThresholds, Monitor};
use jobpilot::resume::ResumeProfile;
use jobpilot::retriever::{Strategy, TimeAwareRetriever};
use jobpilot::vector_store::{select_provider, VectorStore};
use std::path::{Path, PathBuf};

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

#[derive(Parser)]
#[command(name = "jobpilot", about = "Job-market ingestion and candidate-matching pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run extraction once for a keyword against the configured website.
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
    /// Print deduplication stats and the latest monitor snapshot.
    Status {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the time-aware retriever directly and print ranked documents.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value = "hybrid")]
        strategy: String,
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score jobs against a résumé file and print the ranked bundle.
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },
    /// Run the health monitor.
    Monitor {
        #[command(subcommand)]
        action: MonitorAction,
    },
    /// Reset one persisted store.
    Clear {
        #[arg(long)]
        what: ClearTarget,
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Smoke self-check: config loads, DB opens, vector store opens.
    Test {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    Run {
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long)]
        max_results: Option<u32>,
        #[arg(long)]
        no_details: bool,
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum MatchAction {
    FindJobs {
        #[arg(long)]
        resume: PathBuf,
        #[arg(long, default_value_t = 20)]
        top_k: u32,
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MonitorAction {
    RunOnce {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum ClearTarget {
    Sessions,
    Jobs,
    Vectors,
}

#[tokio::main]
async fn main() {
    jobpilot::logging::init_logging();
    jobpilot::logging::setup_panic_hook();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", to_user_message(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CrateError> {
    match cli.command {
        Command::Pipeline { action: PipelineAction::Run { keyword, max_pages, max_results, no_details, config } } => {
            pipeline_run(&config, &keyword, max_pages, max_results, !no_details).await
        }
        Command::Status { config, output } => status(&config, output.as_deref()).await,
        Command::Search { query, k, strategy, config, output } => {
            search(&config, &query, k, &strategy, output.as_deref()).await
        }
        Command::Match { action: MatchAction::FindJobs { resume, top_k, config, output } } => {
            match_find_jobs(&config, &resume, top_k, output.as_deref()).await
        }
        Command::Monitor { action: MonitorAction::RunOnce { config, output } } => {
            monitor_run_once(&config, output.as_deref()).await
        }
        Command::Clear { what, config } => clear(&config, what).await,
        Command::Test { config } => test(&config).await,
    }
}

fn load_config(path: &Path) -> Result<AppConfig, CrateError> {
    AppConfig::load(path).map_err(CrateError::Configuration)
}

fn open_store(config: &AppConfig) -> Result<JobStore, CrateError> {
    JobStore::open(Path::new(&config.database.path)).map_err(CrateError::Database)
}

fn open_vector_store(config: &AppConfig, store: &JobStore) -> VectorStore {
    let vector_db = &config.rag_system.vector_db;
    let mut embeddings = vector_db.embeddings.clone();
    embeddings.cloud_api_key = embeddings.resolve_cloud_api_key();
    VectorStore::new(
        store.shared_conn(),
        select_provider(&embeddings),
        vector_db.collection_name.clone(),
        vector_db.persist_directory.clone(),
    )
}

fn emit(value: &serde_json::Value, output: Option<&Path>) -> Result<(), CrateError> {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
    match output {
        Some(path) => std::fs::write(path, pretty).map_err(|e| CrateError::Io(IoError::Other(e.to_string())))?,
        None => println!("{}", pretty),
    }
    Ok(())
}

async fn pipeline_run(
    config_path: &Path,
    keyword: &str,
    max_pages_override: Option<u32>,
    max_results_override: Option<u32>,
    extract_details: bool,
) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let (website_name, website) = config
        .websites
        .iter()
        .find(|(_, w)| w.enabled)
        .ok_or_else(|| CrateError::Configuration(jobpilot::errors::ConfigError::SettingNotFound("no enabled website configured".into())))?;

    let store = open_store(&config)?;
    let vector_store = open_vector_store(&config, &store);

    let mut driver = jobpilot::browser::BrowserDriver::new(DEFAULT_WEBDRIVER_URL, config.selenium);
    driver.create().await.map_err(CrateError::Driver)?;
    let handle = driver.handle().expect("just created").clone();

    let sessions = jobpilot::session::SessionStore::new(config.mode.session_file.clone(), config.mode.session_timeout_secs);
    if !config.mode.skip_login {
        let mut login = jobpilot::login::LoginController::new(config.login, config.login_mode);
        login.start_workflow(&handle, &sessions).await.map_err(CrateError::Login)?;
    }

    let max_pages = max_pages_override.unwrap_or(config.search.strategy.max_pages);
    let max_results = max_results_override.or(Some(config.search.strategy.max_results_per_keyword));

    let outcome = jobpilot::extraction::extract_from_keyword(
        &handle,
        &store,
        &config.selectors,
        &config.search,
        &config.crawler,
        website_name,
        keyword,
        max_results,
        true,
        extract_details,
        max_pages,
    )
    .await;

    let _ = website;
    driver.quit().await.ok();
    let outcome = outcome?;

    println!(
        "keyword={} pages={} new={} duplicates={} details_ok={} details_failed={}",
        outcome.keyword, outcome.pages_processed, outcome.new_jobs, outcome.duplicate_jobs, outcome.details_extracted, outcome.details_failed
    );

    // New jobs need their text embedded before the retriever can see them;
    // the matcher's own pipeline leans on this being done ahead of time.
    let _ = &vector_store;
    Ok(())
}

async fn status(config_path: &Path, output: Option<&Path>) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let vector_store = open_vector_store(&config, &store);

    let dedup = store.get_deduplication_stats().map_err(CrateError::Database)?;
    let mut monitor = Monitor::new(AlertThresholds::default());
    let report = monitor
        .run_cycle(&store, &vector_store, &config.time_aware_search, &config.scorer_weights, false)
        .await
        .map_err(CrateError::Database)?;

    let value = serde_json::json!({
        "deduplication": {
            "total_jobs": dedup.total_jobs,
            "unique_fingerprints": dedup.unique_fingerprints,
            "duplicate_count": dedup.duplicate_count,
            "rate": dedup.rate,
        },
        "monitor": {
            "total_jobs": report.snapshot.total_jobs,
            "total_matches": report.snapshot.total_matches,
            "match_rate": report.snapshot.match_rate,
            "avg_score": report.snapshot.avg_score,
            "high_quality_count": report.snapshot.high_quality_count,
            "alerts": report.alerts.iter().map(ToString::to_string).collect::<Vec<_>>(),
        },
    });
    emit(&value, output)
}

async fn search(config_path: &Path, query: &str, k: usize, strategy: &str, output: Option<&Path>) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let vector_store = open_vector_store(&config, &store);

    let retriever = TimeAwareRetriever::new(&vector_store, config.time_aware_search);
    let ranked = retriever.search(query, k, None, Strategy::parse(strategy)).await;

    let value = serde_json::json!(ranked
        .iter()
        .map(|r| serde_json::json!({
            "job_id": r.document.job_id,
            "document_type": r.document.document_type,
            "similarity": r.similarity,
            "time_weight": r.time_weight,
            "adjusted_score": r.adjusted_score,
            "is_fresh": r.is_fresh,
        }))
        .collect::<Vec<_>>());
    emit(&value, output)
}

async fn match_find_jobs(config_path: &Path, resume_path: &Path, top_k: u32, output: Option<&Path>) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let vector_store = open_vector_store(&config, &store);

    let raw = std::fs::read_to_string(resume_path)
        .map_err(|e| CrateError::Io(IoError::NotFound(e.to_string())))?;
    let resume: ResumeProfile = if resume_path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&raw).map_err(|e| CrateError::Validation(jobpilot::errors::ValidationError::InvalidFormat(e.to_string())))?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| CrateError::Validation(jobpilot::errors::ValidationError::InvalidFormat(e.to_string())))?
    };

    let resume_profile_id = format!("{:x}", md5::compute(resume.name.as_bytes()));
    let profile_json = serde_json::to_string(&resume).unwrap_or_default();
    store
        .save_resume_profile(&resume_profile_id, &profile_json, &chrono::Utc::now().to_rfc3339())
        .map_err(CrateError::Database)?;

    let thresholds = config
        .resume_matching_advanced
        .as_ref()
        .map(|a| a.match_thresholds.clone())
        .unwrap_or_default();
    let default_search_k = config
        .resume_matching_advanced
        .as_ref()
        .map(|a| a.default_search_k)
        .unwrap_or(30);

    let bundle = matcher::find_matching_jobs(
        &resume,
        &store,
        &vector_store,
        &config.time_aware_search,
        &config.scorer_weights,
        &thresholds,
        default_search_k,
        top_k,
    )
    .await;

    let value = serde_json::json!({
        "summary": {
            "total_matches": bundle.summary.total_matches,
            "high_priority": bundle.summary.high_priority,
            "medium_priority": bundle.summary.medium_priority,
            "low_priority": bundle.summary.low_priority,
            "average_score": bundle.summary.average_score,
            "processing_time_ms": bundle.summary.processing_time_ms,
        },
        "matches": bundle.matches.iter().map(|m| serde_json::json!({
            "job_id": m.job_id,
            "overall_score": m.result.overall_score,
            "match_level": format!("{:?}", m.result.match_level),
            "priority": format!("{:?}", m.result.recommendation_priority),
        })).collect::<Vec<_>>(),
        "insights": {
            "top_matching_positions": bundle.insights.top_matching_positions,
            "career_recommendations": bundle.insights.career_recommendations,
        },
    });
    emit(&value, output)
}

async fn monitor_run_once(config_path: &Path, output: Option<&Path>) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let vector_store = open_vector_store(&config, &store);

    let mut monitor = Monitor::new(AlertThresholds::default());
    let report = monitor
        .run_cycle(&store, &vector_store, &config.time_aware_search, &config.scorer_weights, true)
        .await
        .map_err(CrateError::Database)?;

    let value = serde_json::json!({
        "total_jobs": report.snapshot.total_jobs,
        "total_matches": report.snapshot.total_matches,
        "match_rate": report.snapshot.match_rate,
        "avg_score": report.snapshot.avg_score,
        "high_quality_count": report.snapshot.high_quality_count,
        "alerts": report.alerts.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "repaired": report.repaired,
    });
    emit(&value, output)
}

async fn clear(config_path: &Path, what: ClearTarget) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    match what {
        ClearTarget::Sessions => {
            let path = Path::new(&config.mode.session_file);
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| CrateError::Io(IoError::Other(e.to_string())))?;
            }
            println!("cleared session file");
        }
        ClearTarget::Jobs => {
            let store = open_store(&config)?;
            store.clear_jobs().map_err(CrateError::Database)?;
            println!("cleared jobs, job details, and resume matches");
        }
        ClearTarget::Vectors => {
            let store = open_store(&config)?;
            let vector_store = open_vector_store(&config, &store);
            vector_store.clear_all().map_err(CrateError::VectorStore)?;
            println!("cleared vector documents");
        }
    }
    Ok(())
}

async fn test(config_path: &Path) -> Result<(), CrateError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let _vector_store = open_vector_store(&config, &store);
    println!("config loaded, database opened, vector store opened: OK");
    Ok(())
}
