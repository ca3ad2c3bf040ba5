//! Unified error types for the pipeline
//!
//! One variant per error kind named in the error-handling design: leaf
//! enums for each subsystem, wrapped by a single top-level `CrateError`.
//! Mirrors the nesting shape used elsewhere in this codebase rather than
//! a derive-macro error crate, so user-facing messages stay hand-tunable.

use std::fmt;

/// Top-level error type returned by every public entry point.
#[derive(Debug, Clone)]
pub enum CrateError {
    Configuration(ConfigError),
    Driver(DriverError),
    Login(LoginError),
    Database(DatabaseError),
    VectorStore(VectorStoreError),
    PageParse(PageParseError),
    Validation(ValidationError),
    Io(IoError),
}

/// Missing required key, malformed YAML, or an invalid setting value.
/// Fatal at startup.
#[derive(Debug, Clone)]
pub enum ConfigError {
    SettingNotFound(String),
    InvalidValue(String),
    FileNotFound(String),
    ParseError(String),
    Other(String),
}

/// Browser crashed or became unresponsive. Recoverable via a driver
/// restart; if restart also fails, fatal for the current run.
#[derive(Debug, Clone)]
pub enum DriverError {
    CreateFailed(String),
    NotAlive(String),
    RestartFailed(String),
    CommandFailed(String),
    Timeout(String),
}

/// Login workflow failures. `Timeout` is retryable by prompting for
/// interactive login; the other variants are terminal for the current run.
#[derive(Debug, Clone)]
pub enum LoginError {
    Timeout(String),
    AttemptsExhausted { attempts: u32, reason: String },
    Terminal(String),
}

/// Storage-layer failures. Non-fatal at the call site: the caller logs
/// and proceeds, and a later run will re-observe the same fingerprint.
#[derive(Debug, Clone)]
pub enum DatabaseError {
    ConnectionFailed(String),
    QueryFailed(String),
    MigrationFailed(String),
    ConstraintViolation(String),
    NotFound(String),
    InvalidData(String),
}

/// Embedding or similarity-search failure. Retrieval falls back to a
/// simpler path; ingestion escalates to a `DatabaseError`.
#[derive(Debug, Clone)]
pub enum VectorStoreError {
    EmbeddingFailed(String),
    SearchFailed(String),
    NotFound(String),
    BackendError(String),
}

/// A selector yielded no usable content after the fallback list was
/// exhausted. Non-fatal: the caller skips the item.
#[derive(Debug, Clone)]
pub enum PageParseError {
    SelectorExhausted { field: String, tried: Vec<String> },
    EmptyResult(String),
    AntiBotPage(String),
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField(String),
    InvalidFormat(String),
    OutOfRange(String),
    BusinessRule(String),
    General(String),
}

#[derive(Debug, Clone)]
pub enum IoError {
    NotFound(String),
    PermissionDenied(String),
    Other(String),
}

impl fmt::Display for CrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrateError::Configuration(e) => write!(f, "configuration error: {}", e),
            CrateError::Driver(e) => write!(f, "driver error: {}", e),
            CrateError::Login(e) => write!(f, "login error: {}", e),
            CrateError::Database(e) => write!(f, "database error: {}", e),
            CrateError::VectorStore(e) => write!(f, "vector store error: {}", e),
            CrateError::PageParse(e) => write!(f, "page parse error: {}", e),
            CrateError::Validation(e) => write!(f, "validation error: {}", e),
            CrateError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SettingNotFound(s) => write!(f, "setting not found: {}", s),
            ConfigError::InvalidValue(m) => write!(f, "invalid value: {}", m),
            ConfigError::FileNotFound(p) => write!(f, "config file not found: {}", p),
            ConfigError::ParseError(m) => write!(f, "failed to parse config: {}", m),
            ConfigError::Other(m) => write!(f, "{}", m),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::CreateFailed(m) => write!(f, "failed to create browser session: {}", m),
            DriverError::NotAlive(m) => write!(f, "browser session is not alive: {}", m),
            DriverError::RestartFailed(m) => write!(f, "failed to restart browser session: {}", m),
            DriverError::CommandFailed(m) => write!(f, "driver command failed: {}", m),
            DriverError::Timeout(m) => write!(f, "driver operation timed out: {}", m),
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginError::Timeout(m) => write!(f, "login polling timed out: {}", m),
            LoginError::AttemptsExhausted { attempts, reason } => {
                write!(f, "login failed after {} attempts: {}", attempts, reason)
            }
            LoginError::Terminal(m) => write!(f, "login failed: {}", m),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectionFailed(m) => write!(f, "connection failed: {}", m),
            DatabaseError::QueryFailed(m) => write!(f, "query failed: {}", m),
            DatabaseError::MigrationFailed(m) => write!(f, "migration failed: {}", m),
            DatabaseError::ConstraintViolation(m) => write!(f, "constraint violation: {}", m),
            DatabaseError::NotFound(m) => write!(f, "record not found: {}", m),
            DatabaseError::InvalidData(m) => write!(f, "invalid data: {}", m),
        }
    }
}

impl fmt::Display for VectorStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorStoreError::EmbeddingFailed(m) => write!(f, "embedding failed: {}", m),
            VectorStoreError::SearchFailed(m) => write!(f, "similarity search failed: {}", m),
            VectorStoreError::NotFound(m) => write!(f, "document not found: {}", m),
            VectorStoreError::BackendError(m) => write!(f, "vector backend error: {}", m),
        }
    }
}

impl fmt::Display for PageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageParseError::SelectorExhausted { field, tried } => write!(
                f,
                "no selector produced content for '{}' (tried: {})",
                field,
                tried.join(", ")
            ),
            PageParseError::EmptyResult(m) => write!(f, "empty extraction result: {}", m),
            PageParseError::AntiBotPage(url) => write!(f, "anti-bot page detected at {}", url),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "missing required field: {}", field),
            ValidationError::InvalidFormat(m) => write!(f, "invalid format: {}", m),
            ValidationError::OutOfRange(m) => write!(f, "value out of range: {}", m),
            ValidationError::BusinessRule(m) => write!(f, "business rule violation: {}", m),
            ValidationError::General(m) => write!(f, "{}", m),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::NotFound(p) => write!(f, "not found: {}", p),
            IoError::PermissionDenied(p) => write!(f, "permission denied: {}", p),
            IoError::Other(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for CrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
impl std::error::Error for ConfigError {}
impl std::error::Error for DriverError {}
impl std::error::Error for LoginError {}
impl std::error::Error for DatabaseError {}
impl std::error::Error for VectorStoreError {}
impl std::error::Error for PageParseError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for IoError {}

macro_rules! from_leaf {
    ($leaf:ty, $variant:ident) => {
        impl From<$leaf> for CrateError {
            fn from(err: $leaf) -> Self {
                CrateError::$variant(err)
            }
        }
    };
}

from_leaf!(ConfigError, Configuration);
from_leaf!(DriverError, Driver);
from_leaf!(LoginError, Login);
from_leaf!(DatabaseError, Database);
from_leaf!(VectorStoreError, VectorStore);
from_leaf!(PageParseError, PageParse);
from_leaf!(ValidationError, Validation);
from_leaf!(IoError, Io);

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let error_msg = msg.unwrap_or_else(|| format!("sqlite error code: {:?}", e.code));
                match e.code {
                    rusqlite::ErrorCode::ConstraintViolation => {
                        DatabaseError::ConstraintViolation(error_msg)
                    }
                    _ => DatabaseError::QueryFailed(error_msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                DatabaseError::NotFound("query returned no rows".to_string())
            }
            other => DatabaseError::QueryFailed(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CrateError {
    fn from(err: rusqlite::Error) -> Self {
        CrateError::Database(err.into())
    }
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => IoError::PermissionDenied(err.to_string()),
            _ => IoError::Other(err.to_string()),
        }
    }
}

impl From<std::io::Error> for CrateError {
    fn from(err: std::io::Error) -> Self {
        CrateError::Io(err.into())
    }
}

impl From<serde_yaml::Error> for CrateError {
    fn from(err: serde_yaml::Error) -> Self {
        CrateError::Configuration(ConfigError::ParseError(err.to_string()))
    }
}

/// Short, user-facing message for the CLI's single top-line error print.
pub fn to_user_message(error: &CrateError) -> String {
    match error {
        CrateError::Configuration(e) => format!("configuration problem: {}", e),
        CrateError::Driver(e) => format!("browser driver problem: {}", e),
        CrateError::Login(e) => format!("login problem: {}", e),
        CrateError::Database(e) => format!("storage problem: {}", e),
        CrateError::VectorStore(e) => format!("search index problem: {}", e),
        CrateError::PageParse(e) => format!("page layout problem: {}", e),
        CrateError::Validation(e) => format!("invalid input: {}", e),
        CrateError::Io(e) => format!("file system problem: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_maps_from_sqlite() {
        let err = rusqlite::Connection::open_in_memory()
            .unwrap()
            .execute_batch("CREATE TABLE t(id INTEGER UNIQUE); INSERT INTO t VALUES (1); INSERT INTO t VALUES (1);")
            .unwrap_err();
        let mapped: DatabaseError = err.into();
        assert!(matches!(mapped, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn login_timeout_is_distinguishable_for_retry() {
        let err = LoginError::Timeout("no success indicator within wait_timeout".into());
        assert!(matches!(err, LoginError::Timeout(_)));
    }

    #[test]
    fn display_messages_are_non_empty() {
        let err = CrateError::PageParse(PageParseError::SelectorExhausted {
            field: "title".into(),
            tried: vec![".job-title".into(), ".title".into()],
        });
        let msg = to_user_message(&err);
        assert!(msg.contains("title"));
    }
}
