use std::fmt;
use std::time::Duration;

/// Errors from the rate limiter
#[derive(Debug)]
pub enum RateLimitError {
    /// Waiting for a free slot would take longer than the configured maximum delay
    DelayExceeded {
        bucket: String,
        required: Duration,
        max_delay: Duration,
    },
    /// Reading or writing persisted bucket state failed
    Io(std::io::Error),
    /// Persisted bucket state could not be encoded
    State(serde_json::Error),
    /// The blocking store task panicked or was cancelled
    Task(String),
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DelayExceeded {
                bucket,
                required,
                max_delay,
            } => write!(
                f,
                "Rate limit for {bucket} requires waiting {:.2}s (max delay {:.2}s)",
                required.as_secs_f64(),
                max_delay.as_secs_f64()
            ),
            Self::Io(e) => write!(f, "Bucket store I/O error: {e}"),
            Self::State(e) => write!(f, "Bucket state encoding error: {e}"),
            Self::Task(msg) => write!(f, "Bucket store task failed: {msg}"),
        }
    }
}

impl std::error::Error for RateLimitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::State(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RateLimitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for RateLimitError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(err)
    }
}

pub type Result<T> = std::result::Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_exceeded_display() {
        let err = RateLimitError::DelayExceeded {
            bucket: "api.inaturalist.org".to_string(),
            required: Duration::from_millis(1500),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit for api.inaturalist.org requires waiting 1.50s (max delay 1.00s)"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        let err: RateLimitError = std::io::Error::other("disk full").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
