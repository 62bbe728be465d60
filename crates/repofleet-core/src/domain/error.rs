//! Domain-level error taxonomy for repofleet.

/// Errors that abort the whole run before any repository is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("config file {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("repo list {path}: {reason}")]
    RepoList { path: String, reason: String },

    #[error("replacement rule {index}: {reason}")]
    Rule { index: usize, reason: String },

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown auth method: {0}")]
    UnknownAuthMethod(String),

    #[error("auth: {0}")]
    Auth(String),
}

/// Repofleet domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("git error: {0}")]
    Git(String),

    #[error("source branch missing: {0}")]
    SourceBranchMissing(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("http error: {0}")]
    Http(String),

    #[error("pull request rejected: {0}")]
    PullRequestRejected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        FleetError::Http(err.to_string())
    }
}

/// Result type for repofleet domain operations.
pub type Result<T> = std::result::Result<T, FleetError>;
