use thiserror::Error;

/// Snapshot of a non-2xx response, kept for diagnostics.
///
/// `reqwest::Response` is consumed when its body is read, so the parts worth
/// reporting are copied out before the error is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub endpoint: String,
    pub body: String,
    /// Unix timestamp from `x-rate-limit-reset`, when the server sent one.
    pub reset_at: Option<i64>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// HTTP 429. Recoverable: the caller should pause and retry later.
    #[error("rate limited on {}", .0.endpoint)]
    RateLimited(ApiResponse),

    /// Any other non-2xx response.
    #[error("API request to {} failed with status {}", .0.endpoint, .0.status)]
    ApiFail(ApiResponse),

    /// Request rejected locally before any network call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Pagination gave up after too many consecutive failures on one cursor.
    #[error("gave up on cursor {cursor} after {attempts} consecutive failures")]
    RetriesExhausted { cursor: String, attempts: u32 },
}

impl GraphError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GraphError::RateLimited(_))
    }

    /// The response snapshot carried by `RateLimited` / `ApiFail`.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            GraphError::RateLimited(r) | GraphError::ApiFail(r) => Some(r),
            _ => None,
        }
    }
}
