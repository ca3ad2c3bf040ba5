//! Page Parser (C6): pure DOM-to-data extraction, no browser lifecycle
//! management (that's C4) and no pagination-loop orchestration (C7).
//!
//! Selector resolution policy: the configured selector list is tried
//! first; if every configured selector comes back empty, a fixed
//! fallback list is walked next; if that is also empty the field is
//! logged and given a placeholder rather than guessed. Implemented as
//! "first non-empty wins" over one `Vec<&str>` per field, not nested
//! try/catch, per the selector-fallback redesign.

use crate::config::SelectorsConfig;
use crate::errors::PageParseError;
use crate::fingerprint;
use scraper::{Html, Selector};
use thirtyfour::{By, WebDriver, WebElement};

const FALLBACK_CONTAINER: &[&str] = &[".job-list", ".search-results", "ul.job-list", "#joblist"];
const FALLBACK_ITEM: &[&str] = &[".job-item", ".job-card", "li.job", "tr.job-row"];
const FALLBACK_TITLE: &[&str] = &[".job-title", ".title", "h3", "a.job-name"];
const FALLBACK_COMPANY: &[&str] = &[".company-name", ".company", ".corp-name"];
const FALLBACK_SALARY: &[&str] = &[".salary", ".job-salary", ".pay"];
const FALLBACK_LOCATION: &[&str] = &[".location", ".job-area", ".city"];
const FALLBACK_EXPERIENCE: &[&str] = &[".experience", ".job-exp", ".exp-req"];
const FALLBACK_EDUCATION: &[&str] = &[".education", ".degree", ".edu-req"];
const FALLBACK_DESCRIPTION: &[&str] = &[".job-description", ".description", "#job-detail-content"];
const FALLBACK_REQUIREMENTS: &[&str] = &[".job-requirements", ".requirements"];
const FALLBACK_BENEFITS: &[&str] = &[".job-benefits", ".benefits", ".welfare"];
const FALLBACK_NEXT_PAGE: &[&str] = &[".pagination .next", "a.next-page", "[aria-label='Next']"];

const DEFAULT_COMPANY: &str = "未知公司";
const DEFAULT_SALARY: &str = "薪资面议";
const DEFAULT_LOCATION: &str = "地点未知";
const DEFAULT_EXPERIENCE: &str = "经验不限";
const DEFAULT_EDUCATION: &str = "学历不限";

#[derive(Debug, Clone)]
pub struct JobRow {
    pub title: String,
    pub company: String,
    pub salary: String,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub url: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default)]
pub struct JobDetailResult {
    pub description: String,
    pub requirements: String,
    pub benefits: String,
    pub company_scale: String,
    pub industry: String,
    pub publish_time: String,
}

#[derive(Debug, Clone)]
pub struct PageInfo {
    pub current_page: u32,
    pub has_next: bool,
    pub url: String,
    pub title: String,
}

/// Combine the operator's configured selectors with the hard-coded
/// fallback list, configured ones first.
fn prioritized(configured: Option<&Vec<String>>, fallback: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = configured.cloned().unwrap_or_default();
    out.extend(fallback.iter().map(|s| s.to_string()));
    out
}

async fn find_first(scope: &WebDriver, selectors: &[String]) -> Option<WebElement> {
    for selector in selectors {
        if let Ok(elements) = scope.find_all(By::Css(selector)).await {
            if let Some(el) = elements.into_iter().next() {
                return Some(el);
            }
        }
    }
    None
}

async fn text_of_first(scope: &WebElement, selectors: &[String]) -> Option<String> {
    for selector in selectors {
        if let Ok(elements) = scope.find_all(By::Css(selector)).await {
            for el in elements {
                if let Ok(text) = el.text().await {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }
    None
}

/// Find the list container, enumerate its items, and extract each
/// field via "first non-empty wins". Missing subfields get a
/// placeholder, never a null.
pub async fn parse_job_list(
    driver: &WebDriver,
    selectors: &SelectorsConfig,
    max_results: Option<usize>,
) -> Result<Vec<JobRow>, PageParseError> {
    let paired = parse_job_list_with_elements(driver, selectors, max_results).await?;
    Ok(paired.into_iter().map(|(row, _)| row).collect())
}

/// Same extraction as [`parse_job_list`], but keeps each row paired
/// with the DOM element it came from (in the same order), so a caller
/// that needs to click through to a detail page never has to re-query
/// the list and risk drifting out of sync with it.
pub async fn parse_job_list_with_elements(
    driver: &WebDriver,
    selectors: &SelectorsConfig,
    max_results: Option<usize>,
) -> Result<Vec<(JobRow, WebElement)>, PageParseError> {
    let container_selectors = prioritized(
        selectors.search_page.get("container"),
        FALLBACK_CONTAINER,
    );
    let container = find_first(driver, &container_selectors).await.ok_or_else(|| {
        PageParseError::SelectorExhausted {
            field: "container".into(),
            tried: container_selectors.clone(),
        }
    })?;

    let item_selectors = prioritized(selectors.search_page.get("item"), FALLBACK_ITEM);
    let items = container
        .find_all(By::Css(&item_selectors.join(", ")))
        .await
        .unwrap_or_default();

    let title_sel = prioritized(selectors.search_page.get("title"), FALLBACK_TITLE);
    let company_sel = prioritized(selectors.search_page.get("company"), FALLBACK_COMPANY);
    let salary_sel = prioritized(selectors.search_page.get("salary"), FALLBACK_SALARY);
    let location_sel = prioritized(selectors.search_page.get("location"), FALLBACK_LOCATION);
    let experience_sel = prioritized(selectors.search_page.get("experience"), FALLBACK_EXPERIENCE);
    let education_sel = prioritized(selectors.search_page.get("education"), FALLBACK_EDUCATION);

    let mut rows = Vec::new();
    for item in items {
        if let Some(limit) = max_results {
            if rows.len() >= limit {
                break;
            }
        }

        let title = text_of_first(&item, &title_sel).await.unwrap_or_default();
        if title.is_empty() {
            log::warn!("skipping job item with no extractable title");
            continue;
        }
        let company = text_of_first(&item, &company_sel)
            .await
            .unwrap_or_else(|| DEFAULT_COMPANY.to_string());
        let salary = text_of_first(&item, &salary_sel)
            .await
            .unwrap_or_else(|| DEFAULT_SALARY.to_string());
        let location = text_of_first(&item, &location_sel)
            .await
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let experience = text_of_first(&item, &experience_sel)
            .await
            .unwrap_or_else(|| DEFAULT_EXPERIENCE.to_string());
        let education = text_of_first(&item, &education_sel)
            .await
            .unwrap_or_else(|| DEFAULT_EDUCATION.to_string());
        let url = match item.find(By::Css("a")).await {
            Ok(a) => a.attr("href").await.ok().flatten().unwrap_or_default(),
            Err(_) => String::new(),
        };

        let fp = fingerprint::fingerprint(&title, &company, &salary, &location);

        let row = JobRow {
            title,
            company,
            salary,
            location,
            experience,
            education,
            url,
            fingerprint: fp,
        };
        rows.push((row, item));
    }

    Ok(rows)
}

/// Waits for `document.readyState === "complete"`, then tries the
/// configured description selectors, falling back to a script that
/// scans candidate containers for the one with the largest
/// `innerText`. A result with a description under 20 characters and no
/// requirements text is treated as a failed extraction.
pub async fn parse_job_detail(
    driver: &WebDriver,
    selectors: &SelectorsConfig,
) -> Result<Option<JobDetailResult>, PageParseError> {
    wait_for_document_ready(driver).await;

    let description_sel = prioritized(
        selectors.job_detail.get("description"),
        FALLBACK_DESCRIPTION,
    );
    let mut description = String::new();
    for selector in &description_sel {
        if let Ok(elements) = driver.find_all(By::Css(selector)).await {
            for el in elements {
                if let Ok(text) = el.text().await {
                    if text.trim().len() > description.len() {
                        description = text.trim().to_string();
                    }
                }
            }
        }
    }
    if description.is_empty() {
        description = largest_innertext_fallback(driver).await.unwrap_or_default();
    }

    let requirements_sel = prioritized(
        selectors.job_detail.get("requirements"),
        FALLBACK_REQUIREMENTS,
    );
    let requirements = text_of_first_on_driver(driver, &requirements_sel)
        .await
        .unwrap_or_default();

    if description.len() < 20 && requirements.is_empty() {
        log::warn!("job detail extraction failed: description too short and no requirements");
        return Ok(None);
    }

    let benefits_sel = prioritized(selectors.job_detail.get("benefits"), FALLBACK_BENEFITS);
    let benefits = text_of_first_on_driver(driver, &benefits_sel).await.unwrap_or_default();
    let company_scale = text_of_first_on_driver(
        driver,
        &prioritized(selectors.job_detail.get("company_scale"), &[".company-scale"]),
    )
    .await
    .unwrap_or_default();
    let industry = text_of_first_on_driver(
        driver,
        &prioritized(selectors.job_detail.get("industry"), &[".industry"]),
    )
    .await
    .unwrap_or_default();
    let publish_time = text_of_first_on_driver(
        driver,
        &prioritized(selectors.job_detail.get("publish_time"), &[".publish-time", ".date"]),
    )
    .await
    .unwrap_or_default();

    Ok(Some(JobDetailResult {
        description,
        requirements,
        benefits,
        company_scale,
        industry,
        publish_time,
    }))
}

async fn text_of_first_on_driver(driver: &WebDriver, selectors: &[String]) -> Option<String> {
    for selector in selectors {
        if let Ok(elements) = driver.find_all(By::Css(selector)).await {
            for el in elements {
                if let Ok(text) = el.text().await {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }
    None
}

pub(crate) async fn wait_for_document_ready(driver: &WebDriver) {
    for _ in 0..30 {
        if let Ok(ret) = driver.execute("return document.readyState;", vec![]).await {
            if ret.json().as_str() == Some("complete") {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

const INNER_TEXT_SCAN_SCRIPT: &str = r#"
var candidates = document.querySelectorAll('div, article, section');
var best = '';
for (var i = 0; i < candidates.length; i++) {
    var text = candidates[i].innerText || '';
    if (text.length > best.length) { best = text; }
}
return best;
"#;

async fn largest_innertext_fallback(driver: &WebDriver) -> Option<String> {
    driver
        .execute(INNER_TEXT_SCAN_SCRIPT, vec![])
        .await
        .ok()
        .and_then(|r| r.json().as_str().map(str::to_string))
}

/// Success is either a URL change or enough elapsed time for AJAX
/// pagination to have settled; never raises.
pub async fn navigate_to_next_page(driver: &WebDriver, selectors: &SelectorsConfig) -> bool {
    let next_sel = prioritized(selectors.search_page.get("next_page"), FALLBACK_NEXT_PAGE);
    let Some(next) = find_first(driver, &next_sel).await else {
        return false;
    };
    let old_url = driver.current_url().await.map(|u| u.to_string()).unwrap_or_default();
    if next.click().await.is_err() {
        return false;
    }
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(url) = driver.current_url().await {
            if url.to_string() != old_url {
                return true;
            }
        }
    }
    true
}

pub async fn has_next_page(driver: &WebDriver, selectors: &SelectorsConfig) -> bool {
    let next_sel = prioritized(selectors.search_page.get("next_page"), FALLBACK_NEXT_PAGE);
    find_first(driver, &next_sel).await.is_some()
}

/// Parses the current page number from a known set of query params
/// (`page`, `p`, `pageNum`, `pageIndex`, `currentPage`), defaulting to 1.
pub fn parse_page_number_from_url(url: &str) -> u32 {
    const PARAM_NAMES: &[&str] = &["page", "p", "pageNum", "pageIndex", "currentPage"];
    let Some(query_start) = url.find('?') else {
        return 1;
    };
    let query = &url[query_start + 1..];
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if PARAM_NAMES.contains(&key) {
                if let Ok(n) = value.parse::<u32>() {
                    return n;
                }
            }
        }
    }
    1
}

/// Static-HTML counterpart of [`parse_job_detail`], for server-rendered
/// fragments and for parsing saved snapshots in tests — no live driver
/// involved. Same prioritized-selector-then-meta-tag-then-JSON-LD
/// fallback chain this pipeline's list/detail extraction follows, just
/// evaluated against a parsed document instead of the DOM.
pub fn parse_job_detail_static(html: &str, selectors: &SelectorsConfig) -> Option<JobDetailResult> {
    let document = Html::parse_document(html);

    let description_sel = prioritized(selectors.job_detail.get("description"), FALLBACK_DESCRIPTION);
    let mut description = text_of_first_static(&document, &description_sel).unwrap_or_default();
    if description.is_empty() {
        description = extract_from_meta_tags(&document);
    }
    if description.is_empty() {
        description = extract_from_json_ld(&document).unwrap_or_default();
    }

    let requirements_sel = prioritized(selectors.job_detail.get("requirements"), FALLBACK_REQUIREMENTS);
    let requirements = text_of_first_static(&document, &requirements_sel).unwrap_or_default();

    if description.len() < 20 && requirements.is_empty() {
        log::warn!("static job detail extraction failed: description too short and no requirements");
        return None;
    }

    let benefits_sel = prioritized(selectors.job_detail.get("benefits"), FALLBACK_BENEFITS);
    let benefits = text_of_first_static(&document, &benefits_sel).unwrap_or_default();

    Some(JobDetailResult {
        description,
        requirements,
        benefits,
        company_scale: String::new(),
        industry: String::new(),
        publish_time: String::new(),
    })
}

fn text_of_first_static(document: &Html, selectors: &[String]) -> Option<String> {
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

const META_DESCRIPTION_SELECTORS: &[&str] = &[
    "meta[property='og:description']",
    "meta[name='description']",
    "meta[property='description']",
];

fn extract_from_meta_tags(document: &Html) -> String {
    for selector_str in META_DESCRIPTION_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                if let Some(content) = element.value().attr("content") {
                    if !content.trim().is_empty() {
                        return content.trim().to_string();
                    }
                }
            }
        }
    }
    String::new()
}

/// Pulls `description` out of a `JobPosting`-shaped JSON-LD block when
/// present; most job boards that render server-side embed one.
fn extract_from_json_ld(document: &Html) -> Option<String> {
    let selector = Selector::parse("script[type='application/ld+json']").ok()?;
    for element in document.select(&selector) {
        let text = element.text().collect::<String>();
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(desc) = json.get("description").and_then(|v| v.as_str()) {
                if !desc.trim().is_empty() {
                    return Some(desc.trim().to_string());
                }
            }
        }
    }
    None
}

pub async fn get_current_page_info(driver: &WebDriver, selectors: &SelectorsConfig) -> PageInfo {
    let url = driver.current_url().await.map(|u| u.to_string()).unwrap_or_default();
    let title = driver.title().await.unwrap_or_default();
    let current_page = parse_page_number_from_url(&url);
    let has_next = has_next_page(driver, selectors).await;
    PageInfo {
        current_page,
        has_next,
        url,
        title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prioritized_puts_configured_selectors_first() {
        let configured = vec![".custom-title".to_string()];
        let result = prioritized(Some(&configured), FALLBACK_TITLE);
        assert_eq!(result[0], ".custom-title");
        assert_eq!(result.len(), 1 + FALLBACK_TITLE.len());
    }

    #[test]
    fn prioritized_falls_back_when_unconfigured() {
        let result = prioritized(None, FALLBACK_TITLE);
        assert_eq!(result, FALLBACK_TITLE.to_vec());
    }

    #[test]
    fn parse_page_number_reads_known_params() {
        assert_eq!(parse_page_number_from_url("https://x.com/search?page=3"), 3);
        assert_eq!(parse_page_number_from_url("https://x.com/search?p=5"), 5);
        assert_eq!(
            parse_page_number_from_url("https://x.com/search?pageNum=2&other=1"),
            2
        );
    }

    #[test]
    fn parse_page_number_defaults_to_one() {
        assert_eq!(parse_page_number_from_url("https://x.com/search"), 1);
        assert_eq!(parse_page_number_from_url("https://x.com/search?foo=bar"), 1);
    }

    #[test]
    fn parse_job_detail_static_prefers_configured_selector() {
        let html = r#"<html><body><div class="job-description">
            A very detailed job description spanning well over twenty characters.
        </div></body></html>"#;
        let detail = parse_job_detail_static(html, &SelectorsConfig::default()).unwrap();
        assert!(detail.description.contains("very detailed"));
    }

    #[test]
    fn parse_job_detail_static_falls_back_to_meta_description() {
        let html = r#"<html><head>
            <meta property="og:description" content="A concise meta-sourced job description that clears the length floor.">
        </head><body></body></html>"#;
        let detail = parse_job_detail_static(html, &SelectorsConfig::default()).unwrap();
        assert!(detail.description.contains("meta-sourced"));
    }

    #[test]
    fn parse_job_detail_static_returns_none_when_too_sparse() {
        let html = "<html><body><div class=\"job-description\">short</div></body></html>";
        assert!(parse_job_detail_static(html, &SelectorsConfig::default()).is_none());
    }
}
