//! Calendar-specific error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    EventNotFound(String),

    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl CalendarError {
    /// Map a non-success HTTP status and the service's error message.
    pub fn from_status(status: u16, message: String, retry_after: Option<u64>) -> Self {
        match status {
            400 => Self::InvalidEventData(message),
            401 => Self::TokenExpired,
            403 => Self::AccessDenied(message),
            404 | 410 => Self::EventNotFound(message),
            409 => Self::Conflict(message),
            429 => Self::RateLimited(retry_after.unwrap_or(60)),
            _ => Self::ApiError { status, message },
        }
    }
}
