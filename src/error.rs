use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors. Job-level failures use [`ScrapeError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run {0} has no failed items to retry")]
    NothingToRetry(Uuid),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy for a single scrape job. The executor maps every
/// connector/limiter/store failure into one of these; nothing else
/// crosses the item boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("no connector matches URL: {0}")]
    UnsupportedRetailer(String),

    #[error("timed out waiting for a {retailer} rate limit slot ({waited_ms}ms)")]
    RateLimitTimeout { retailer: String, waited_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("product not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted { attempts: u32, last: Box<ScrapeError> },
}

impl ScrapeError {
    /// Stable machine-readable kind, recorded on failed items so callers
    /// can retry or alert selectively.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::UnsupportedRetailer(_) => "unsupported_retailer",
            ScrapeError::RateLimitTimeout { .. } => "rate_limit_timeout",
            ScrapeError::Network(_) => "network_error",
            ScrapeError::Parse(_) => "parse_error",
            ScrapeError::NotFound(_) => "not_found",
            ScrapeError::Storage(_) => "storage_error",
            ScrapeError::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
        }
    }

    /// Map a reqwest failure onto the taxonomy. Timeouts, connect errors
    /// and 5xx/429 responses are all network-class (transient); a 404 is
    /// a permanent not-found.
    pub fn from_http(url: &str, err: &reqwest::Error) -> ScrapeError {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return ScrapeError::NotFound(url.to_string());
            }
        }
        ScrapeError::Network(format!("{}: {}", url, err))
    }

    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(url: &str, status: reqwest::StatusCode) -> ScrapeError {
        if status == reqwest::StatusCode::NOT_FOUND {
            ScrapeError::NotFound(url.to_string())
        } else {
            ScrapeError::Network(format!("{}: HTTP {}", url, status))
        }
    }
}
