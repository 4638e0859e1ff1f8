//! Error type for external generation services.

use thiserror::Error;

/// Errors returned by a generation service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The reply could not be parsed or lacked required data.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The service is missing credentials or endpoint configuration.
    #[error("service not configured: {0}")]
    NotConfigured(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            ServiceError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Http(e.to_string())
        }
    }
}
