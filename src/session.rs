//! Browser Session Store (C3): snapshot a logged-in browser session to
//! disk (cookies, local/session storage, current URL) and restore it on
//! a later run, so login only has to succeed once per TTL window.
//!
//! Semantics follow the reference implementation's session manager:
//! `save`/`load`/`apply_to_browser`/`is_valid`/`list_sessions`/`delete`.

use crate::errors::IoError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thirtyfour::{By, WebDriver};

/// Default session TTL: one hour, matching the reference implementation's
/// `session_timeout` default.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub current_url: String,
    pub cookies: Vec<CookieSnapshot>,
    pub local_storage: HashMap<String, String>,
    pub session_storage: HashMap<String, String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSnapshot {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub filepath: PathBuf,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub current_url: String,
    pub cookies_count: usize,
    pub local_storage_count: usize,
    pub session_storage_count: usize,
    pub is_expired: bool,
}

pub struct SessionStore {
    default_path: PathBuf,
    timeout_secs: i64,
}

impl SessionStore {
    pub fn new(default_path: impl Into<PathBuf>, timeout_secs: i64) -> Self {
        Self {
            default_path: default_path.into(),
            timeout_secs,
        }
    }

    fn resolve(&self, filepath: Option<&Path>) -> PathBuf {
        filepath
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_path.clone())
    }

    /// Collect cookies, storage and the current URL from a live browser
    /// session and write them atomically (write-to-tempfile, then
    /// rename) so a crash mid-write never leaves a truncated file.
    pub async fn save(
        &self,
        driver: &WebDriver,
        filepath: Option<&Path>,
    ) -> Result<(), IoError> {
        let path = self.resolve(filepath);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = self.collect(driver).await;
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| IoError::Other(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &path)?;
        log::info!("saved session to {}", path.display());
        Ok(())
    }

    async fn collect(&self, driver: &WebDriver) -> SessionData {
        let current_url = driver
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();
        let user_agent = driver
            .execute("return navigator.userAgent;", vec![])
            .await
            .ok()
            .and_then(|r| r.json().as_str().map(str::to_string))
            .unwrap_or_default();

        let cookies = driver
            .get_all_cookies()
            .await
            .map(|cookies| {
                cookies
                    .into_iter()
                    .map(|c| CookieSnapshot {
                        name: c.name().to_string(),
                        value: c.value().to_string(),
                        domain: c.domain().map(str::to_string),
                        path: c.path().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let local_storage = read_storage(driver, "localStorage").await;
        let session_storage = read_storage(driver, "sessionStorage").await;

        SessionData {
            timestamp: chrono::Utc::now(),
            current_url,
            cookies,
            local_storage,
            session_storage,
            user_agent,
        }
    }

    /// Load a session file, reject it if past its TTL, and apply it to
    /// the given browser: navigate to the origin, restore cookies and
    /// storage, then navigate back to the original URL.
    pub async fn load(
        &self,
        driver: &WebDriver,
        filepath: Option<&Path>,
    ) -> Result<bool, IoError> {
        let path = self.resolve(filepath);
        if !path.exists() {
            log::warn!("session file does not exist: {}", path.display());
            return Ok(false);
        }

        let raw = std::fs::read_to_string(&path)?;
        let data: SessionData =
            serde_json::from_str(&raw).map_err(|e| IoError::Other(e.to_string()))?;

        if self.is_expired(&data) {
            log::warn!("session at {} has expired", path.display());
            return Ok(false);
        }

        self.apply_to_browser(driver, &data).await;
        log::info!("restored session from {}", path.display());
        Ok(true)
    }

    async fn apply_to_browser(&self, driver: &WebDriver, data: &SessionData) {
        if !data.current_url.is_empty() {
            if let Some(origin) = origin_of(&data.current_url) {
                driver.goto(&origin).await.ok();
            }
        }

        driver.delete_all_cookies().await.ok();

        for cookie in &data.cookies {
            let mut c = thirtyfour::Cookie::new(cookie.name.clone(), cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                c.set_domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                c.set_path(path.clone());
            }
            if let Err(e) = driver.add_cookie(c).await {
                log::debug!("failed to restore cookie {}: {}", cookie.name, e);
            }
        }

        write_storage(driver, "localStorage", &data.local_storage).await;
        write_storage(driver, "sessionStorage", &data.session_storage).await;

        if !data.current_url.is_empty() {
            driver.goto(&data.current_url).await.ok();
        }
    }

    pub fn is_expired(&self, data: &SessionData) -> bool {
        let age = chrono::Utc::now().signed_duration_since(data.timestamp);
        age.num_seconds() > self.timeout_secs
    }

    /// Whether the live browser session currently shows any of the
    /// configured login-success selectors.
    pub async fn is_valid(&self, driver: &WebDriver, success_indicators: &[String]) -> bool {
        for selector in success_indicators {
            if let Ok(elements) = driver.find_all(By::Css(selector)).await {
                for el in elements {
                    if matches!(el.is_displayed().await, Ok(true)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn info(&self, filepath: Option<&Path>) -> Option<SessionInfo> {
        let path = self.resolve(filepath);
        let raw = std::fs::read_to_string(&path).ok()?;
        let data: SessionData = serde_json::from_str(&raw).ok()?;
        Some(SessionInfo {
            is_expired: self.is_expired(&data),
            cookies_count: data.cookies.len(),
            local_storage_count: data.local_storage.len(),
            session_storage_count: data.session_storage.len(),
            current_url: data.current_url,
            timestamp: data.timestamp,
            filepath: path,
        })
    }

    pub fn delete(&self, filepath: Option<&Path>) -> std::io::Result<bool> {
        let path = self.resolve(filepath);
        if path.exists() {
            std::fs::remove_file(&path)?;
            log::info!("deleted session file {}", path.display());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// All `*session*.json` files under `directory`, newest first.
    pub fn list_sessions(&self, directory: &Path) -> Vec<SessionInfo> {
        let mut sessions = Vec::new();
        let Ok(entries) = std::fs::read_dir(directory) else {
            return sessions;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.contains("session") && name.ends_with(".json") {
                if let Some(info) = self.info(Some(&path)) {
                    sessions.push(info);
                }
            }
        }
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sessions
    }
}

fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")? + 3;
    let rest = &url[scheme_end..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    Some(format!("{}{}", &url[..scheme_end], &rest[..host_end]))
}

async fn read_storage(driver: &WebDriver, kind: &str) -> HashMap<String, String> {
    let script = format!(
        "var items = {{}}; for (var i = 0; i < {kind}.length; i++) {{ \
         var key = {kind}.key(i); items[key] = {kind}.getItem(key); }} return items;"
    );
    driver
        .execute(&script, vec![])
        .await
        .ok()
        .and_then(|r| serde_json::from_value(r.json().clone()).ok())
        .unwrap_or_default()
}

async fn write_storage(driver: &WebDriver, kind: &str, items: &HashMap<String, String>) {
    for (key, value) in items {
        let script = format!("{kind}.setItem(arguments[0], arguments[1]);");
        if let Err(e) = driver
            .execute(&script, vec![key.clone().into(), value.clone().into()])
            .await
        {
            log::debug!("failed to restore {} item {}: {}", kind, key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data(timestamp: chrono::DateTime<chrono::Utc>) -> SessionData {
        SessionData {
            timestamp,
            current_url: "https://jobs.example.com/search?q=rust".into(),
            cookies: vec![CookieSnapshot {
                name: "session_id".into(),
                value: "abc123".into(),
                domain: Some("jobs.example.com".into()),
                path: Some("/".into()),
            }],
            local_storage: HashMap::new(),
            session_storage: HashMap::new(),
            user_agent: "test-agent".into(),
        }
    }

    #[test]
    fn fresh_session_is_not_expired() {
        let store = SessionStore::new("data/session.json", DEFAULT_SESSION_TIMEOUT_SECS);
        let data = sample_data(chrono::Utc::now());
        assert!(!store.is_expired(&data));
    }

    #[test]
    fn session_older_than_timeout_is_expired() {
        let store = SessionStore::new("data/session.json", 3600);
        let old = chrono::Utc::now() - chrono::Duration::seconds(7200);
        let data = sample_data(old);
        assert!(store.is_expired(&data));
    }

    #[test]
    fn origin_extraction_strips_path_and_query() {
        assert_eq!(
            origin_of("https://jobs.example.com/search?q=rust").unwrap(),
            "https://jobs.example.com"
        );
    }

    #[test]
    fn save_then_load_round_trips_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let data = sample_data(chrono::Utc::now());
        let json = serde_json::to_string_pretty(&data).unwrap();
        std::fs::write(&path, json).unwrap();

        let store = SessionStore::new(&path, DEFAULT_SESSION_TIMEOUT_SECS);
        let info = store.info(None).unwrap();
        assert_eq!(info.cookies_count, 1);
        assert!(!info.is_expired);
    }

    #[test]
    fn missing_session_file_has_no_info() {
        let store = SessionStore::new("data/does-not-exist.json", DEFAULT_SESSION_TIMEOUT_SECS);
        assert!(store.info(None).is_none());
    }
}
