//! Extraction Pipeline (C7) — the hardest part: the top-level loop that
//! builds a search URL, paginates, deduplicates against the job store,
//! optionally clicks through to each job's detail page, and persists
//! everything exactly once per listing even across session loss,
//! pagination, and anti-bot redirects.
//!
//! `async/await` here is largely cosmetic in the sense the crate-wide
//! redesign flag describes: there is exactly one browser to serialize
//! against and every operation inside this loop (DOM query, click, DB
//! write) blocks the pipeline until it completes. Because the WebDriver
//! client itself is network-bound (`thirtyfour` speaks HTTP to the
//! driver process), the loop is still written as a single `async fn`
//! rather than moved onto `spawn_blocking` — there is no synchronous
//! WebDriver API to block on — but it deliberately runs with no
//! concurrent fan-out, which is the property the flag actually cares
//! about (see DESIGN.md).

use crate::config::{CrawlerConfig, SearchConfig, SelectorsConfig};
use crate::db::{Job, JobDetail, JobStore};
use crate::errors::CrateError;
use crate::parser;
use rand::Rng;
use std::time::Duration;
use thirtyfour::WebDriver;

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub keyword: String,
    pub pages_processed: u32,
    pub new_jobs: u32,
    pub duplicate_jobs: u32,
    pub details_extracted: u32,
    pub details_failed: u32,
}

/// `{search.base_url}?jobArea={job_area}&keyword={url-quoted keyword}&searchType={search_type}&keywordType={keyword_type}`.
pub fn build_search_url(search: &SearchConfig, keyword: &str) -> String {
    format!(
        "{}?jobArea={}&keyword={}&searchType={}&keywordType={}",
        search.base_url,
        urlencode(&search.job_area),
        urlencode(keyword),
        urlencode(&search.search_type),
        urlencode(&search.keyword_type),
    )
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn synthesize_job_id(detail_url: &str, title: &str, company: &str) -> String {
    let basis = if !detail_url.is_empty() {
        detail_url.to_string()
    } else {
        format!("{}|{}|{}", title, company, detail_url)
    };
    format!("{:x}", md5::compute(basis.as_bytes()))[..16].to_string()
}

#[allow(clippy::too_many_arguments)]
pub async fn extract_from_keyword(
    driver: &WebDriver,
    store: &JobStore,
    selectors: &SelectorsConfig,
    search: &SearchConfig,
    crawler: &CrawlerConfig,
    website: &str,
    keyword: &str,
    max_results: Option<u32>,
    save_results: bool,
    extract_details: bool,
    max_pages: u32,
) -> Result<ExtractionOutcome, CrateError> {
    let mut outcome = ExtractionOutcome {
        keyword: keyword.to_string(),
        ..Default::default()
    };

    let search_url = build_search_url(search, keyword);
    driver
        .goto(&search_url)
        .await
        .map_err(|e| crate::errors::DriverError::CommandFailed(e.to_string()))?;
    parser::wait_for_document_ready(driver).await;

    let mut current_page = 1u32;
    while current_page <= max_pages {
        let remaining = max_results.map(|m| (m - outcome.new_jobs) as usize);
        if remaining == Some(0) {
            break;
        }

        let paired = parser::parse_job_list_with_elements(driver, selectors, remaining)
            .await
            .map_err(CrateError::from)?;

        let fingerprints: Vec<String> = paired.iter().map(|(row, _)| row.fingerprint.clone()).collect();
        let exists_map = store.batch_check_fingerprints(&fingerprints).map_err(CrateError::from)?;

        for (row, element) in paired {
            if exists_map.get(&row.fingerprint).copied().unwrap_or(false) {
                outcome.duplicate_jobs += 1;
                continue;
            }

            let mut detail_url = row.url.clone();
            let mut detail_result = None;

            if extract_details {
                let original_handle = driver.window().await.ok();
                let original_handles = driver.windows().await.ok();

                if maybe_hover_and_click(driver, &element).await {
                    let opened = match (&original_handle, &original_handles) {
                        (Some(handle), Some(handles)) => try_open_detail(driver, selectors, handle, handles).await,
                        _ => None,
                    };
                    if let Some((url, detail)) = opened {
                        detail_url = url;
                        detail_result = detail;
                        if detail_result.is_none() {
                            outcome.details_failed += 1;
                        } else {
                            outcome.details_extracted += 1;
                        }
                    } else {
                        log::warn!("no new tab opened for '{}' at {}", row.title, row.company);
                        outcome.details_failed += 1;
                    }
                }
            }

            let job_id = synthesize_job_id(&detail_url, &row.title, &row.company);
            if save_results {
                let job = Job {
                    job_id: job_id.clone(),
                    title: row.title.clone(),
                    company: row.company.clone(),
                    url: detail_url.clone(),
                    job_fingerprint: Some(row.fingerprint.clone()),
                    application_status: "pending".into(),
                    match_score: None,
                    website: website.to_string(),
                    created_at: chrono::Utc::now().to_rfc3339(),
                    submitted_at: None,
                    is_deleted: false,
                    rag_processed: false,
                };
                if store.save_job(&job).map_err(CrateError::from)? {
                    outcome.new_jobs += 1;
                }

                if let Some(detail) = detail_result {
                    let job_detail = JobDetail {
                        job_id,
                        salary: row.salary.clone(),
                        location: row.location.clone(),
                        experience: row.experience.clone(),
                        education: row.education.clone(),
                        description: detail.description,
                        requirements: detail.requirements,
                        benefits: detail.benefits,
                        publish_time: detail.publish_time,
                        company_scale: detail.company_scale,
                        industry: detail.industry,
                        keyword: keyword.to_string(),
                        extracted_at: chrono::Utc::now().to_rfc3339(),
                    };
                    store.save_job_detail(&job_detail, &detail_url).map_err(CrateError::from)?;
                }
            } else {
                outcome.new_jobs += 1;
            }

            if let Some(limit) = max_results {
                if outcome.new_jobs >= limit {
                    break;
                }
            }
        }

        outcome.pages_processed = current_page;

        if let Some(limit) = max_results {
            if outcome.new_jobs >= limit {
                break;
            }
        }
        if !parser::has_next_page(driver, selectors).await {
            break;
        }
        if crawler.page_delay_sleep() > Duration::ZERO {
            tokio::time::sleep(crawler.page_delay_sleep()).await;
        }
        if !parser::navigate_to_next_page(driver, selectors).await {
            break;
        }
        current_page += 1;
    }

    Ok(outcome)
}

/// Scrolls the element into view and, 30% of the time, hovers over it
/// before clicking — cosmetic anti-bot flavor, not part of the
/// pipeline's persistence contract.
async fn maybe_hover_and_click(driver: &WebDriver, element: &thirtyfour::WebElement) -> bool {
    element.scroll_into_view().await.ok();
    if rand::thread_rng().gen_bool(0.3) {
        element.move_mouse_over().await.ok();
    }
    driver.window().await.is_ok() && element.click().await.is_ok()
}

/// After a click that should open a detail page in a new tab: detect
/// the new window handle, switch to it, read the canonical URL, parse
/// the detail, close the tab, and switch back.
///
/// `original_handle`/`original_handles` must be captured by the caller
/// *before* the click, so a tab that opens synchronously with the
/// click is never mistaken for part of the pre-click baseline. On any
/// exit path — success, wait timeout, or a WebDriver call failing
/// partway through — the driver always ends back on `original_handle`.
async fn try_open_detail(
    driver: &WebDriver,
    selectors: &SelectorsConfig,
    original_handle: &thirtyfour::WindowHandle,
    original_handles: &[thirtyfour::WindowHandle],
) -> Option<(String, Option<parser::JobDetailResult>)> {
    let mut new_handle = None;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(handles) = driver.windows().await {
            if handles.len() > original_handles.len() {
                new_handle = handles.into_iter().find(|h| !original_handles.contains(h));
                if new_handle.is_some() {
                    break;
                }
            }
        }
    }
    let new_handle = new_handle?;

    let result = async {
        driver.switch_to_window(new_handle.clone()).await.ok()?;
        parser::wait_for_document_ready(driver).await;

        let url = driver.current_url().await.ok()?.to_string();
        let is_blocked = url.contains("captcha") || url.contains("block") || url.contains("error");
        let detail = if is_blocked {
            None
        } else {
            parser::parse_job_detail(driver, selectors).await.unwrap_or(None)
        };
        Some((url, detail))
    }
    .await;

    driver.close_window().await.ok();
    driver.switch_to_window(original_handle.clone()).await.ok();

    result
}

impl CrawlerConfig {
    fn page_delay_sleep(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_matches_documented_format() {
        let search = SearchConfig {
            base_url: "https://jobs.example.com/search".into(),
            job_area: "shanghai".into(),
            keyword_type: "title".into(),
            search_type: "default".into(),
            ..SearchConfig::default()
        };
        let url = build_search_url(&search, "rust engineer");
        assert_eq!(
            url,
            "https://jobs.example.com/search?jobArea=shanghai&keyword=rust%20engineer&searchType=default&keywordType=title"
        );
    }

    #[test]
    fn synthesize_job_id_prefers_detail_url() {
        let a = synthesize_job_id("https://x.com/jobs/1", "Engineer", "ACME");
        let b = synthesize_job_id("https://x.com/jobs/1", "Other Title", "Other Co");
        assert_eq!(a, b);
    }

    #[test]
    fn synthesize_job_id_falls_back_to_title_company() {
        let a = synthesize_job_id("", "Engineer", "ACME");
        let b = synthesize_job_id("", "Engineer", "ACME");
        let c = synthesize_job_id("", "Engineer", "Other Co");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn urlencode_escapes_spaces_and_keeps_alnum() {
        assert_eq!(urlencode("rust engineer"), "rust%20engineer");
        assert_eq!(urlencode("abc-123_.~"), "abc-123_.~");
    }
}
