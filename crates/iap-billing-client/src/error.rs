//! Client error types.

/// Errors that can occur when using the iap-billing client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Missing or wrong cron secret / admin key.
    #[error("unauthorized")]
    Unauthorized,

    /// Apple could not be reached by the service.
    #[error("upstream verification failed: {0}")]
    Upstream(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
