//! Per-URL expiration rules

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a response may be served from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiration {
    /// Keep until explicitly invalidated
    Never,
    /// Keep for a fixed time after storing
    After(Duration),
    /// Never store
    DoNotCache,
}

impl Expiration {
    pub const fn seconds(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    pub const fn minutes(minutes: u64) -> Self {
        Self::seconds(minutes * 60)
    }

    pub const fn days(days: u64) -> Self {
        Self::seconds(days * 86_400)
    }

    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::DoNotCache) && *self != Self::After(Duration::ZERO)
    }

    /// Expiration from a `Cache-Control` header value, if it carries a directive we honour.
    ///
    /// `no-store` and `no-cache` mean the response is not cached. Otherwise `max-age` sets the
    /// lifetime, and `max-age=0` also means not cached.
    pub fn from_cache_control(header: &str) -> Option<Self> {
        let mut max_age = None;
        for directive in header.split(',').map(|d| d.trim().to_ascii_lowercase()) {
            match directive.split_once('=') {
                None if directive == "no-store" || directive == "no-cache" => {
                    return Some(Self::DoNotCache)
                }
                Some(("max-age", value)) => {
                    max_age = value.trim_matches('"').parse::<u64>().ok().or(max_age);
                }
                _ => {}
            }
        }
        max_age.map(|secs| {
            if secs == 0 {
                Self::DoNotCache
            } else {
                Self::seconds(secs)
            }
        })
    }

    /// Expiry timestamp for an entry stored at `stored_at`; `None` when it never expires
    pub fn expires_at(&self, stored_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Never => None,
            Self::After(ttl) => {
                let ttl = chrono::Duration::from_std(*ttl).unwrap_or(chrono::Duration::MAX);
                Some(stored_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            Self::DoNotCache => Some(stored_at),
        }
    }
}

/// A URL glob pattern matched against URLs with their scheme removed
///
/// `*` matches any run of characters (including `/`) and `?` matches one character. A
/// pattern matches any URL it is a prefix of, so `api.example.org/v1/taxa` also matches
/// `https://api.example.org/v1/taxa/1?locale=en`.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    glob: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let stripped = strip_scheme(glob);
        let mut source = String::with_capacity(stripped.len() + 8);
        source.push('^');
        for c in stripped.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                c => source.push_str(&regex::escape(&c.to_string())),
            }
        }

        let regex = Regex::new(&source).map_err(|source| CacheError::Pattern {
            pattern: glob.to_string(),
            source,
        })?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(strip_scheme(url))
    }
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// Ordered URL patterns with an expiration each, plus a fallback
///
/// The first matching pattern wins.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    patterns: Vec<(UrlPattern, Expiration)>,
    default: Expiration,
}

impl ExpirationPolicy {
    pub fn new(default: Expiration) -> Self {
        Self {
            patterns: Vec::new(),
            default,
        }
    }

    /// Add a pattern checked after those already present
    pub fn with_pattern(mut self, glob: &str, expiration: Expiration) -> Result<Self> {
        self.patterns.push((UrlPattern::new(glob)?, expiration));
        Ok(self)
    }

    /// Add patterns checked before those already present, keeping their relative order
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Expiration)>,
    {
        let mut patterns = overrides
            .into_iter()
            .map(|(glob, expiration)| Ok((UrlPattern::new(glob)?, expiration)))
            .collect::<Result<Vec<_>>>()?;
        patterns.append(&mut self.patterns);
        self.patterns = patterns;
        Ok(self)
    }

    pub fn with_default(mut self, default: Expiration) -> Self {
        self.default = default;
        self
    }

    pub fn default_expiration(&self) -> Expiration {
        self.default
    }

    pub fn expiration_for(&self, url: &str) -> Expiration {
        self.patterns
            .iter()
            .find(|(pattern, _)| pattern.matches(url))
            .map_or(self.default, |(_, expiration)| *expiration)
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(Expiration::minutes(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_directives() {
        assert_eq!(
            Expiration::from_cache_control("public, max-age=3600"),
            Some(Expiration::seconds(3600))
        );
        assert_eq!(
            Expiration::from_cache_control("max-age=60, no-store"),
            Some(Expiration::DoNotCache)
        );
        assert_eq!(Expiration::from_cache_control("No-Cache"), Some(Expiration::DoNotCache));
        assert_eq!(Expiration::from_cache_control("max-age=0"), Some(Expiration::DoNotCache));
        assert_eq!(Expiration::from_cache_control("public"), None);
        assert_eq!(Expiration::from_cache_control("max-age=soon"), None);
    }

    #[test]
    fn test_glob_ignores_scheme_and_matches_prefix() {
        let pattern = UrlPattern::new("https://api.inaturalist.org/v*/taxa").unwrap();
        assert!(pattern.matches("https://api.inaturalist.org/v1/taxa/47219?locale=en"));
        assert!(pattern.matches("http://api.inaturalist.org/v2/taxa"));
        assert!(!pattern.matches("https://api.inaturalist.org/v1/observations"));
    }

    #[test]
    fn test_glob_escapes_regex_characters() {
        let pattern = UrlPattern::new("example.org/a+b").unwrap();
        assert!(pattern.matches("example.org/a+b"));
        assert!(!pattern.matches("example.org/aab"));
    }

    #[test]
    fn test_leading_wildcard() {
        let pattern = UrlPattern::new("api.inaturalist.org/*autocomplete").unwrap();
        assert!(pattern.matches("https://api.inaturalist.org/v1/taxa/autocomplete?q=owl"));
        assert!(!pattern.matches("https://www.inaturalist.org/taxa/autocomplete"));
    }

    #[test]
    fn test_first_match_wins() {
        let policy = ExpirationPolicy::new(Expiration::minutes(30))
            .with_pattern("example.org/taxa/autocomplete", Expiration::days(30))
            .unwrap()
            .with_pattern("example.org/taxa", Expiration::days(7))
            .unwrap();

        assert_eq!(
            policy.expiration_for("https://example.org/taxa/autocomplete?q=a"),
            Expiration::days(30)
        );
        assert_eq!(policy.expiration_for("https://example.org/taxa/1"), Expiration::days(7));
        assert_eq!(policy.expiration_for("https://example.org/users/1"), Expiration::minutes(30));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let policy = ExpirationPolicy::default()
            .with_pattern("example.org/taxa", Expiration::days(7))
            .unwrap()
            .with_overrides([("example.org/taxa", Expiration::DoNotCache)])
            .unwrap();

        assert_eq!(policy.expiration_for("https://example.org/taxa/1"), Expiration::DoNotCache);
    }

    #[test]
    fn test_expires_at() {
        let now = Utc::now();
        assert_eq!(Expiration::Never.expires_at(now), None);
        assert_eq!(
            Expiration::seconds(60).expires_at(now),
            Some(now + chrono::Duration::seconds(60))
        );
        assert!(!Expiration::DoNotCache.is_cacheable());
        assert!(!Expiration::seconds(0).is_cacheable());
        assert!(Expiration::Never.is_cacheable());
    }
}
