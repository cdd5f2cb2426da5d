use thiserror::Error;

/// Unified error type for the orchestration layer.
///
/// Expected failures carry enough context for the API boundary to map them to
/// an HTTP status; everything else collapses into `Internal`.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("a job template with name '{name}' already exists in this scope")]
    DuplicateName { name: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type OpsResult<T> = Result<T, OpsError>;

impl OpsError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn duplicate_name<S: Into<String>>(name: S) -> Self {
        Self::DuplicateName { name: name.into() }
    }
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Errors a caller may reasonably retry after a short delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OpsError::Upstream(_) | OpsError::Queue(_) | OpsError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(err: serde_json::Error) -> Self {
        OpsError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OpsError {
    fn from(err: anyhow::Error) -> Self {
        OpsError::Internal(err.to_string())
    }
}
