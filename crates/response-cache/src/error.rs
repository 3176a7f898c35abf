use std::fmt;

/// Errors from the response cache
#[derive(Debug)]
pub enum CacheError {
    /// Reading or writing a persisted entry failed
    Io(std::io::Error),
    /// A persisted entry could not be encoded or decoded
    Json(serde_json::Error),
    /// A URL glob pattern could not be compiled
    Pattern { pattern: String, source: regex::Error },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Cache I/O error: {e}"),
            Self::Json(e) => write!(f, "Cache entry encoding error: {e}"),
            Self::Pattern { pattern, source } => {
                write!(f, "Invalid URL pattern '{pattern}': {source}")
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Pattern { source, .. } => Some(source),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
