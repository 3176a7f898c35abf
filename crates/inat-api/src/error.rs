//! Error types for the iNaturalist client

use crate::constants::RETRY_STATUSES;
use crate::transport::TransportError;
use inat_ratelimit::RateLimitError;
use response_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InatError {
    /// A parameter or response field failed local validation; never sent or retried
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("Not found: {url}")]
    NotFound { url: String, body: Option<String> },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Rate limiter error: {0}")]
    RateLimit(RateLimitError),

    #[error("Credential store error: {0}")]
    CredentialStore(String),
}

impl InatError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        let body = Some(body).filter(|b| !b.is_empty());
        match status {
            401 | 403 => Self::Authentication {
                message: format!("{url} returned status {status}"),
                status: Some(status),
                body,
            },
            404 => Self::NotFound {
                url: url.to_string(),
                body,
            },
            429 => Self::RateLimitExceeded {
                message: format!("{url} returned status 429"),
                status: Some(status),
                body,
            },
            _ => Self::RequestFailed {
                message: format!("{url} returned status {status}"),
                status: Some(status),
                body,
            },
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// HTTP status of the response that caused this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::RateLimitExceeded { status, .. }
            | Self::RequestFailed { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Body of the response that caused this error, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Authentication { body, .. }
            | Self::RateLimitExceeded { body, .. }
            | Self::RequestFailed { body, .. }
            | Self::NotFound { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Whether a request failing with this error may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::RateLimitExceeded { status, .. } => status.is_some(),
            Self::RequestFailed { status, .. } => {
                status.is_some_and(|s| RETRY_STATUSES.contains(&s))
            }
            _ => false,
        }
    }
}

impl From<RateLimitError> for InatError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::DelayExceeded { .. } => Self::RateLimitExceeded {
                message: err.to_string(),
                status: None,
                body: None,
            },
            other => Self::RateLimit(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, InatError>;
