use thiserror::Error;

/// Errors from the model API client.
#[derive(Error, Debug)]
pub enum ModelApiError {
    /// Invalid request parameters or malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed due to invalid or missing API key
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded, retry after waiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// API server encountered an internal error
    #[error("API server error: {0}")]
    ServerError(String),

    /// API server is overloaded, retry later
    #[error("API server overloaded")]
    Overloaded,

    /// Network error occurred during request
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization or deserialization error
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out waiting for response
    #[error("Timeout waiting for response")]
    Timeout,

    /// The response carried no usable text content
    #[error("Empty response from model")]
    EmptyResponse,

    /// Unknown error occurred
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ModelApiError {
    /// Returns true if this error is transient and should be retried:
    /// rate limits, server errors, overload, and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelApiError::RateLimitExceeded
                | ModelApiError::ServerError(_)
                | ModelApiError::Overloaded
                | ModelApiError::Timeout
        )
    }

    /// Create error from HTTP status code and response body.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => ModelApiError::InvalidRequest(body),
            401 | 403 => ModelApiError::AuthenticationFailed(body),
            429 => ModelApiError::RateLimitExceeded,
            500 | 502 | 503 | 504 => ModelApiError::ServerError(body),
            529 => ModelApiError::Overloaded,
            _ => ModelApiError::Unknown(format!("HTTP {status}: {body}")),
        }
    }
}
