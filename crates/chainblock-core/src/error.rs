use graph_client::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any network call: malformed target, empty import,
    /// verb not allowed for the purpose.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid blocklist: {0}")]
    Blocklist(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
