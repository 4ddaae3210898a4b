use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failed search, used as the analytics key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Auth,
    RateLimited,
    NotFound,
    BadQuerySyntax,
    ServerError,
    Network,
    Timeout,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::BadQuerySyntax => "bad_query_syntax",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
        }
    }

    /// Maps a backend HTTP status code onto a category.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCategory::BadQuerySyntax,
            401 | 403 => ErrorCategory::Auth,
            404 => ErrorCategory::NotFound,
            408 => ErrorCategory::Timeout,
            429 => ErrorCategory::RateLimited,
            _ => ErrorCategory::ServerError,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::ServerError
                | ErrorCategory::Network
                | ErrorCategory::Timeout
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected input. Always raised before the cache or the executor is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field name must not be empty")]
    EmptyField,

    #[error("Invalid field name '{0}'")]
    InvalidField(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Operator '{operator}' cannot be used with a {value_kind} value on field '{field}'")]
    IncompatibleOperator {
        field: String,
        operator: String,
        value_kind: &'static str,
    },

    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("Unrecognized date '{input}', expected one of: {}", .accepted.join(", "))]
    UnrecognizedDateFormat {
        input: String,
        accepted: Vec<&'static str>,
    },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Cannot parse query at '{0}'")]
    Parse(String),
}

/// Failure reported by the remote executor.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{category} error: {message}")]
pub struct ExecutorError {
    pub category: ErrorCategory,
    pub message: String,
    pub retriable: bool,
    pub status: Option<u16>,
}

impl ExecutorError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            retriable: category.is_retriable(),
            status: None,
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorCategory::from_status(status), message)
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }
}

/// Internal cache inconsistency. Logged and treated as a miss, never returned to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Error returned by [`crate::SearchOrchestrator::search`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Search failed: {0}")]
    Executor(#[from] ExecutorError),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::Executor(e) => e.category,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
