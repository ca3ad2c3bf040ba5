//! Browser Driver Wrapper (C4): a single WebDriver session plus the
//! anti-automation masking this pipeline depends on to look like an
//! ordinary browser, not a Selenium/WebDriver client.

use crate::config::SeleniumConfig;
use crate::errors::DriverError;
use std::sync::OnceLock;
use std::time::Duration;
use thirtyfour::{DesiredCapabilities, WebDriver};

/// Rotated per session so repeated runs don't all present the same
/// fingerprint to a target site.
const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/123.0.0.0 Safari/537.36",
];

fn pool_index() -> &'static std::sync::atomic::AtomicUsize {
    static IDX: OnceLock<std::sync::atomic::AtomicUsize> = OnceLock::new();
    IDX.get_or_init(|| std::sync::atomic::AtomicUsize::new(0))
}

fn pick_user_agent() -> &'static str {
    let idx = pool_index().fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    USER_AGENT_POOL[idx % USER_AGENT_POOL.len()]
}

/// The `navigator`/`chrome.*` overrides applied after session creation.
/// Each statement is independently best-effort: a property that can't be
/// redefined on a given driver/browser combination is simply skipped.
const MASKING_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'platform', { get: () => 'Win32' });
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
Object.defineProperty(navigator, 'deviceMemory', { get: () => 8 });
window.chrome = window.chrome || { runtime: {} };
delete navigator.__proto__.webdriver;
"#;

pub struct BrowserDriver {
    driver: Option<WebDriver>,
    webdriver_url: String,
    config: SeleniumConfig,
}

impl BrowserDriver {
    pub fn new(webdriver_url: impl Into<String>, config: SeleniumConfig) -> Self {
        Self {
            driver: None,
            webdriver_url: webdriver_url.into(),
            config,
        }
    }

    pub async fn create(&mut self) -> Result<(), DriverError> {
        let mut caps = DesiredCapabilities::chrome();
        if self.config.headless {
            caps.set_headless().map_err(|e| DriverError::CreateFailed(e.to_string()))?;
        }
        caps.add_arg(&format!(
            "--window-size={},{}",
            self.config.window_size.0, self.config.window_size.1
        ))
        .map_err(|e| DriverError::CreateFailed(e.to_string()))?;
        caps.add_arg(&format!("--user-agent={}", pick_user_agent()))
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;
        caps.add_arg("--disable-blink-features=AutomationControlled")
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;
        caps.exclude_switches(vec!["enable-automation"])
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;

        let driver = WebDriver::new(&self.webdriver_url, caps)
            .await
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;

        driver
            .set_page_load_timeout(Duration::from_secs(self.config.page_load_timeout_secs))
            .await
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;
        driver
            .set_implicit_wait_timeout(Duration::from_secs(self.config.implicit_wait_secs))
            .await
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;

        driver
            .execute(MASKING_SCRIPT, vec![])
            .await
            .map_err(|e| DriverError::CreateFailed(e.to_string()))?;

        log::info!("browser session created ({}x{})", self.config.window_size.0, self.config.window_size.1);
        self.driver = Some(driver);
        Ok(())
    }

    pub fn handle(&self) -> Option<&WebDriver> {
        self.driver.as_ref()
    }

    /// Probes liveness by reading `current_url`; any driver error means
    /// the underlying browser process or session has died.
    pub async fn is_alive(&self) -> bool {
        match &self.driver {
            Some(driver) => driver.current_url().await.is_ok(),
            None => false,
        }
    }

    pub async fn restart(&mut self) -> Result<(), DriverError> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.ok();
        }
        self.create().await.map_err(|e| DriverError::RestartFailed(e.to_string()))
    }

    pub async fn quit(&mut self) -> Result<(), DriverError> {
        if let Some(driver) = self.driver.take() {
            driver
                .quit()
                .await
                .map_err(|e| DriverError::CommandFailed(e.to_string()))?;
        }
        Ok(())
    }

    pub fn create_wait(&self, timeout: Duration) -> Result<WaitHandle<'_>, DriverError> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| DriverError::NotAlive("no active session".into()))?;
        Ok(WaitHandle { driver, timeout })
    }
}

/// Thin handle binding a timeout to `driver.query(...).wait(...)` calls
/// without re-threading the timeout through every call site.
pub struct WaitHandle<'a> {
    pub driver: &'a WebDriver,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_pool_rotates() {
        let a = pick_user_agent();
        let b = pick_user_agent();
        assert!(USER_AGENT_POOL.contains(&a));
        assert!(USER_AGENT_POOL.contains(&b));
    }

    #[tokio::test]
    async fn is_alive_false_before_create() {
        let driver = BrowserDriver::new(
            "http://localhost:9515",
            SeleniumConfig {
                headless: true,
                window_size: (1280, 800),
                page_load_timeout_secs: 30,
                element_wait_timeout_secs: 10,
                implicit_wait_secs: 5,
            },
        );
        assert!(!driver.is_alive().await);
    }

    #[test]
    fn create_wait_fails_without_session() {
        let driver = BrowserDriver::new(
            "http://localhost:9515",
            SeleniumConfig {
                headless: true,
                window_size: (1280, 800),
                page_load_timeout_secs: 30,
                element_wait_timeout_secs: 10,
                implicit_wait_secs: 5,
            },
        );
        assert!(driver.create_wait(Duration::from_secs(5)).is_err());
    }
}
