use std::env;
use std::path::PathBuf;
use std::time::Duration;

use inat_ratelimit::Rate;
use response_cache::Expiration;
use serde::{Deserialize, Deserializer};

use crate::auth::Credentials;
use crate::constants::*;
use crate::request::Method;

/// Client session configuration
///
/// Built with [`ClientConfig::default`] or [`ClientConfig::from_env`] and adjusted with the
/// `with_*` setters. It also deserializes from a caller's own config file; durations are
/// given in seconds there.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_v0_url: String,
    pub api_v1_url: String,
    pub api_v2_url: String,

    /// Requests per second; `0` disables the window
    pub per_second: f64,
    pub per_minute: f64,
    pub per_day: f64,
    /// Opt-in: widens the per-second window to `per_second * burst` requests per `burst`
    /// seconds. The default of 1 keeps every one-second window within `per_second`.
    pub burst: u32,
    /// Longest rate-limit wait before a request fails with `RateLimitExceeded`
    #[serde(deserialize_with = "seconds")]
    pub max_delay: Duration,
    /// Shared rate-limit state for multiple processes; in memory when `None`
    pub ratelimit_path: Option<PathBuf>,

    pub cache_enabled: bool,
    /// Persistent cache directory; in memory when `None`
    pub cache_dir: Option<PathBuf>,
    pub cacheable_methods: Vec<Method>,
    /// Expiration for URLs that match no pattern
    pub expire_after: Expiration,
    /// URL glob patterns with their expiration, checked before the built-in patterns
    pub urls_expire_after: Vec<(String, Expiration)>,
    /// Let a response's `Cache-Control` header set its expiration
    pub cache_control: bool,
    /// Serve an expired cached response when the request fails after all retries
    pub stale_if_error: bool,

    pub retries: u32,
    /// Retries sleep `backoff_factor * 2^attempt` seconds
    pub backoff_factor: f64,
    #[serde(deserialize_with = "seconds")]
    pub timeout: Duration,
    #[serde(deserialize_with = "seconds")]
    pub connect_timeout: Duration,

    /// Appended to the library's own User-Agent
    pub user_agent: Option<String>,

    /// Describe every request instead of sending it
    pub dry_run: bool,
    /// Describe write requests (POST, PUT, PATCH, DELETE) instead of sending them
    pub dry_run_write_only: bool,

    pub credentials: Credentials,
    /// A pre-fetched access token, used instead of the credential chain
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            api_v0_url: API_V0.to_string(),
            api_v1_url: API_V1.to_string(),
            api_v2_url: API_V2.to_string(),
            per_second: REQUESTS_PER_SECOND,
            per_minute: REQUESTS_PER_MINUTE,
            per_day: REQUESTS_PER_DAY,
            burst: REQUEST_BURST_RATE,
            max_delay: MAX_DELAY,
            ratelimit_path: data_dir.as_ref().map(|d| d.join(RATELIMIT_FILE_NAME)),
            cache_enabled: true,
            cache_dir: data_dir.map(|d| d.join(CACHE_DIR_NAME)),
            cacheable_methods: vec![Method::Get],
            cache_control: true,
            stale_if_error: true,
            expire_after: DEFAULT_CACHE_EXPIRATION,
            urls_expire_after: Vec::new(),
            retries: REQUEST_RETRIES,
            backoff_factor: RETRY_BACKOFF,
            timeout: REQUEST_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            user_agent: None,
            dry_run: false,
            dry_run_write_only: false,
            credentials: Credentials::default(),
            access_token: None,
        }
    }
}

impl ClientConfig {
    /// Defaults with environment overrides applied
    ///
    /// Reads `INAT_CACHE_DIR`, `INAT_USER_AGENT`, `DRY_RUN_ENABLED` and `DRY_RUN_WRITE_ONLY`.
    /// Credential variables are read later, by the credential chain.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env::var("INAT_CACHE_DIR").ok().filter(|v| !v.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        config.user_agent = env::var("INAT_USER_AGENT").ok().filter(|v| !v.is_empty());
        config.dry_run = env_flag("DRY_RUN_ENABLED");
        config.dry_run_write_only = env_flag("DRY_RUN_WRITE_ONLY");
        config
    }

    /// Defaults with the cache and rate-limit state kept in memory only
    pub fn in_memory() -> Self {
        Self {
            cache_dir: None,
            ratelimit_path: None,
            ..Self::default()
        }
    }

    /// Point all three API generations at one host, e.g. a local mock server
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.api_v0_url = base.to_string();
        self.api_v1_url = format!("{base}/v1");
        self.api_v2_url = format!("{base}/v2");
        self
    }

    pub fn with_rate_limits(mut self, per_second: f64, per_minute: f64, per_day: f64) -> Self {
        self.per_second = per_second;
        self.per_minute = per_minute;
        self.per_day = per_day;
        self
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_ratelimit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ratelimit_path = Some(path.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cacheable_methods(mut self, methods: Vec<Method>) -> Self {
        self.cacheable_methods = methods;
        self
    }

    pub fn with_expire_after(mut self, expiration: Expiration) -> Self {
        self.expire_after = expiration;
        self
    }

    pub fn with_url_expiration(mut self, pattern: &str, expiration: Expiration) -> Self {
        self.urls_expire_after.push((pattern.to_string(), expiration));
        self
    }

    pub fn with_cache_control(mut self, cache_control: bool) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn with_stale_if_error(mut self, stale_if_error: bool) -> Self {
        self.stale_if_error = stale_if_error;
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff_factor: f64) -> Self {
        self.retries = retries;
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_dry_run_write_only(mut self, dry_run_write_only: bool) -> Self {
        self.dry_run_write_only = dry_run_write_only;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Rate-limit windows, with the per-second window widened by `burst`
    pub fn rates(&self) -> Vec<Rate> {
        let per_second = if self.burst > 1 && self.per_second > 0.0 {
            Rate::from_fraction(
                self.per_second * f64::from(self.burst),
                Duration::from_secs(u64::from(self.burst)),
            )
        } else {
            Rate::per_second(self.per_second)
        };
        vec![
            per_second,
            Rate::per_minute(self.per_minute),
            Rate::per_day(self.per_day),
        ]
    }

    /// Full User-Agent header value
    pub fn user_agent(&self) -> String {
        let base = format!("inat-api/{}", env!("CARGO_PKG_VERSION"));
        match self.user_agent.as_deref().map(str::trim) {
            Some(suffix) if !suffix.is_empty() => format!("{base} {suffix}"),
            _ => base,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_v0_url", &self.api_v0_url)
            .field("api_v1_url", &self.api_v1_url)
            .field("api_v2_url", &self.api_v2_url)
            .field("rates", &self.rates())
            .field("max_delay", &self.max_delay)
            .field("ratelimit_path", &self.ratelimit_path)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_dir", &self.cache_dir)
            .field("cache_control", &self.cache_control)
            .field("stale_if_error", &self.stale_if_error)
            .field("retries", &self.retries)
            .field("dry_run", &self.dry_run)
            .field("dry_run_write_only", &self.dry_run_write_only)
            .field("credentials", &self.credentials)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// `<platform data dir>/inaturalist`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(DATA_DIR_NAME))
}

/// Any value except empty, `false` or `none` (case insensitive) counts as set
fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "false" | "none")
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
