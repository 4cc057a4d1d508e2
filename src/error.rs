use thiserror::Error;

/// Errors produced by feed fetching and synchronization.
///
/// The taxonomy matters to callers: `Network`, `Timeout`, and 5xx
/// `HttpStatus` values are transient and safe to retry; `AuthRequired`
/// should surface a re-authentication prompt and never clears cached pages.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// The "following" feed was requested without an identity token,
    /// or the server rejected the presented token (401/403).
    #[error("Authentication required")]
    AuthRequired,
    /// Response body was not valid JSON for the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FeedError {
    /// Whether the caller may retry the same operation without changing
    /// anything. Auth and decode failures will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network(_) | FeedError::Timeout => true,
            FeedError::HttpStatus(status) => *status >= 500,
            FeedError::AuthRequired | FeedError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(FeedError::HttpStatus(500).is_retryable());
        assert!(FeedError::HttpStatus(503).is_retryable());
        assert!(FeedError::Timeout.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!FeedError::HttpStatus(404).is_retryable());
        assert!(!FeedError::AuthRequired.is_retryable());
    }
}
