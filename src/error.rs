use thiserror::Error;

/// Error taxonomy for maintenance orchestration.
///
/// Split into two tiers: fatal errors (bad configuration, transport failure,
/// corrupt inventory data) and the single retryable kind, [`FleetError::Check`],
/// raised when a gate is not satisfied *yet* (health not reached, queue not
/// drained, node not rejoined). Callers wrap retryable failures in a bounded
/// retry loop; everything else aborts the maintenance cycle.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cluster API error: {0}")]
    Cluster(String),

    #[error("Remote execution error: {0}")]
    Remote(String),

    #[error("Check not satisfied: {0}")]
    Check(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Metrics signal error: {0}")]
    Metrics(String),

    #[error("Shard operation conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

impl FleetError {
    pub fn config(msg: impl Into<String>) -> Self {
        FleetError::Config(msg.into())
    }

    pub fn cluster(msg: impl Into<String>) -> Self {
        FleetError::Cluster(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        FleetError::Remote(msg.into())
    }

    pub fn check(msg: impl Into<String>) -> Self {
        FleetError::Check(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        FleetError::InvariantViolation(msg.into())
    }

    /// True only for "not ready yet" failures that a bounded retry loop may
    /// attempt again. Fatal kinds must never be masked by a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FleetError::Check(_))
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(error: reqwest::Error) -> Self {
        FleetError::cluster(error.to_string())
    }
}
