use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed result: {0}")]
    MalformedResult(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

/// Coarse classification callers use to pick what to show the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid settings. Needs an operator to fix the environment.
    Config,
    /// Anything that went wrong talking to the warehouse, including results
    /// that did not have the expected shape. Transient.
    Connection,
    /// Failures building presentation frames after a successful load.
    Internal,
}

impl MetricsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::Config(_) => ErrorKind::Config,
            MetricsError::Connection(_)
            | MetricsError::Authentication(_)
            | MetricsError::Statement(_)
            | MetricsError::Timeout(_)
            | MetricsError::MalformedResult(_)
            | MetricsError::Http(_) => ErrorKind::Connection,
            MetricsError::Polars(_) => ErrorKind::Internal,
        }
    }

    /// Whether the next scheduled refresh may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

impl From<polars::error::PolarsError> for MetricsError {
    fn from(err: polars::error::PolarsError) -> Self {
        MetricsError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
