//! Client session: validation, dry runs, caching, rate limiting and retries

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use inat_ratelimit::{Acquisition, Rate, RateLimiter};
use response_cache::{request_signature, CachedResponse, Expiration, ExpirationPolicy, ResponseCache};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{resolve_credentials, CredentialStore};
use crate::config::ClientConfig;
use crate::constants::{default_cache_patterns, REFRESH_INTERVAL, TOKEN_LIFETIME};
use crate::error::{InatError, Result};
use crate::request::{parse_body, ApiRequest, ApiResponse, PreparedRequest, ResponseSource};
use crate::transport::{HttpRequest, ReqwestTransport, Transport};

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < TOKEN_LIFETIME
    }
}

/// Outcome of one network attempt
enum Attempt {
    Done(ApiResponse),
    /// Retry after the server's `Retry-After` delay if it gave one, else after backoff
    Retry(InatError, Option<Duration>),
    Fail(InatError),
}

/// Sends API requests on behalf of every endpoint handle
///
/// One session owns the transport, the response cache, the rate limiter and the access
/// token. Share it with `Arc` so that paginators and endpoint handles draw on the same rate
/// budget and cache.
pub struct Session {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    limiter: RateLimiter,
    /// One fresh read per `?v=` variant of an endpoint per CDN cache period
    refresh_limiter: RateLimiter,
    credential_store: Option<Arc<dyn CredentialStore>>,
    token: Mutex<Option<CachedToken>>,
    user_agent: String,
}

impl Session {
    /// Create a session that sends requests with `reqwest`
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.connect_timeout, &config.user_agent())?;
        Self::with_transport(config, Arc::new(transport)).await
    }

    /// Create a session that sends requests through a custom transport
    pub async fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache = if config.cache_enabled {
            let policy = expiration_policy(&config)?;
            Some(match &config.cache_dir {
                Some(dir) => match ResponseCache::open(dir, policy.clone()).await {
                    Ok(cache) => cache,
                    Err(err) => {
                        warn!(cache_dir = ?dir, error = %err, "Failed to open cache directory, caching in memory");
                        ResponseCache::in_memory(policy)
                    }
                },
                None => ResponseCache::in_memory(policy),
            })
        } else {
            None
        };
        // Expired entries are only kept around to stand in for failed requests
        if let Some(cache) = cache.as_ref().filter(|_| !config.stale_if_error) {
            cache.purge_expired().await;
        }

        let limiter = match &config.ratelimit_path {
            Some(path) => RateLimiter::file_backed(config.rates(), path),
            None => RateLimiter::in_memory(config.rates()),
        }
        .with_max_delay(config.max_delay);
        let refresh_limiter = RateLimiter::in_memory(vec![Rate::new(1, REFRESH_INTERVAL)]);

        debug!(?config, "Session created");
        Ok(Self {
            user_agent: config.user_agent(),
            config,
            transport,
            cache,
            limiter,
            refresh_limiter,
            credential_store: None,
            token: Mutex::new(None),
        })
    }

    /// Look up missing credentials in a secret store, such as the system keyring
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The response cache, unless caching is disabled
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Drop every cached response
    pub async fn clear_cache(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate_all().await?;
        }
        Ok(())
    }

    /// Send a request, or describe it in dry-run mode
    ///
    /// Parameters are validated before anything else, so a [`InatError::Validation`] never
    /// costs a network call.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let query = request.params.preprocess()?;
        let dry_run = self.is_dry_run(&request);

        let token = match &request.access_token {
            Some(token) => Some(token.clone()),
            None if !request.auth_required => None,
            None if dry_run => self.known_token().await,
            None => Some(self.access_token().await?),
        };
        self.dispatch(&request, query, token.as_deref(), dry_run).await
    }

    /// An access token for authenticated requests
    ///
    /// Uses the configured token if there is one. Otherwise credentials are resolved through
    /// the credential chain and exchanged for an OAuth token, then for a JWT, which is reused
    /// until it is a day old.
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let credentials =
            resolve_credentials(&self.config.credentials, self.credential_store.as_deref()).await?;
        let base_url = &self.config.api_v0_url;

        let oauth_request = ApiRequest::post(format!("{base_url}/oauth/token"))
            .json(credentials.token_request_body())
            .expire_after(Expiration::DoNotCache);
        let response = self
            .dispatch(&oauth_request, Vec::new(), None, false)
            .await
            .map_err(token_error)?;
        let oauth_token = string_field(&response.body, "access_token")?;

        let jwt_request = ApiRequest::get(format!("{base_url}/users/api_token"))
            .refresh(true)
            .expire_after(Expiration::DoNotCache);
        let response = self
            .dispatch(&jwt_request, Vec::new(), Some(&oauth_token), false)
            .await
            .map_err(token_error)?;
        let token = string_field(&response.body, "api_token")?;

        info!(username = ?credentials.username, "Retrieved access token");
        *cached = Some(CachedToken {
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(token)
    }

    /// Mark a request to bypass both this cache and the CDN's
    ///
    /// The CDN keeps responses for about two minutes, so a repeated fresh read of the same
    /// endpoint adds a `v` parameter with the lowest value not used in that period.
    pub async fn fresh(&self, request: ApiRequest, endpoint: &str) -> Result<ApiRequest> {
        let mut v = 0u32;
        loop {
            let bucket = format!("{endpoint}?v={v}");
            match self.refresh_limiter.try_acquire(&bucket).await? {
                Acquisition::Granted => break,
                Acquisition::Wait(wait) => {
                    debug!(bucket = %bucket, wait_secs = wait.as_secs(), "Endpoint refreshed recently");
                    v += 1;
                }
            }
        }

        let request = request.refresh(true);
        Ok(if v > 0 { request.param("v", v) } else { request })
    }

    fn is_dry_run(&self, request: &ApiRequest) -> bool {
        request.dry_run.unwrap_or_else(|| {
            self.config.dry_run || (self.config.dry_run_write_only && request.is_write())
        })
    }

    /// A token that is available without network access
    async fn known_token(&self) -> Option<String> {
        if let Some(token) = &self.config.access_token {
            return Some(token.clone());
        }
        let cached = self.token.lock().await;
        cached.as_ref().filter(|t| t.is_fresh()).map(|t| t.token.clone())
    }

    fn prepare(
        &self,
        request: &ApiRequest,
        query: Vec<(String, String)>,
        token: Option<&str>,
    ) -> PreparedRequest {
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        headers.extend(request.headers.iter().cloned());
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        PreparedRequest {
            method: request.method,
            url: request.url.clone(),
            query,
            headers,
            body: request.body.clone(),
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        query: Vec<(String, String)>,
        token: Option<&str>,
        dry_run: bool,
    ) -> Result<ApiResponse> {
        let prepared = self.prepare(request, query, token);
        info!("{}", prepared.describe(dry_run));
        if dry_run {
            return Ok(ApiResponse::dry_run(prepared));
        }

        let cache = self
            .cache
            .as_ref()
            .filter(|_| self.config.cacheable_methods.contains(&request.method));
        let signature = cache.map(|_| {
            let body = prepared.body.as_ref().and_then(|b| b.signature_bytes());
            request_signature(
                prepared.method.as_str(),
                &prepared.url,
                &prepared.query,
                body.as_deref(),
            )
        });

        if let (Some(cache), Some(signature)) = (cache, &signature) {
            if !request.refresh {
                if let Some(entry) = cache.get(signature).await {
                    match ApiResponse::from_cache(&entry) {
                        Ok(response) => return Ok(response),
                        Err(err) => {
                            debug!(key = %signature, error = %err, "Discarding unreadable cached response");
                            cache.invalidate(signature).await;
                        }
                    }
                }
            }
        }

        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = match self.send_with_retries(&prepared, timeout).await {
            Ok(response) => response,
            Err(err) => {
                if let (Some(cache), Some(signature)) = (cache, &signature) {
                    if let Some(response) = self.stale_response(cache, signature, &err).await {
                        return Ok(response);
                    }
                }
                return Err(err);
            }
        };

        if let (Some(cache), Some(signature)) = (cache, signature) {
            let url = prepared.full_url();
            let expiration = request
                .expire_after
                .or_else(|| self.header_expiration(&response))
                .unwrap_or_else(|| cache.policy().expiration_for(&url));
            let entry = CachedResponse::new(
                signature,
                prepared.method.as_str(),
                url,
                response.status,
                response.headers.clone(),
                response.text.clone(),
            );
            if let Err(err) = cache.put_with_expiration(entry, expiration).await {
                warn!(error = %err, "Failed to cache response");
            }
        }
        Ok(response)
    }

    /// Expiration set by the response's `Cache-Control` header, when those are honoured
    fn header_expiration(&self, response: &ApiResponse) -> Option<Expiration> {
        if !self.config.cache_control {
            return None;
        }
        response.header("cache-control").and_then(Expiration::from_cache_control)
    }

    /// An expired cached response standing in for a request that could not be completed
    async fn stale_response(
        &self,
        cache: &ResponseCache,
        signature: &str,
        err: &InatError,
    ) -> Option<ApiResponse> {
        // Client errors mean the request itself is wrong; old data doesn't help there
        let server_side = matches!(err.status(), None | Some(200..=299 | 429 | 500..=599));
        if !self.config.stale_if_error || !server_side {
            return None;
        }
        let entry = cache.get_stale(signature).await?;
        let response = ApiResponse::from_cache(&entry).ok()?;
        warn!(url = %entry.url, error = %err, "Request failed, serving expired cached response");
        Some(response)
    }

    async fn send_with_retries(&self, prepared: &PreparedRequest, timeout: Duration) -> Result<ApiResponse> {
        let bucket = host_of(&prepared.url);
        let mut attempt = 0u32;

        loop {
            self.limiter.acquire(&bucket).await?;

            let (err, retry_after) = match self.send_once(prepared, timeout).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(err, retry_after) => (err, retry_after),
            };

            if attempt >= self.config.retries {
                return Err(match err {
                    InatError::Transport(err) => InatError::RequestFailed {
                        message: format!("{} failed after {} attempts: {err}", prepared.url, attempt + 1),
                        status: None,
                        body: None,
                    },
                    other => other,
                });
            }

            let delay = retry_after
                .map(|wait| wait.min(self.config.max_delay))
                .unwrap_or_else(|| backoff(self.config.backoff_factor, attempt));
            warn!(
                url = %prepared.url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(&self, prepared: &PreparedRequest, timeout: Duration) -> Attempt {
        let http_request = HttpRequest {
            method: prepared.method,
            url: prepared.url.clone(),
            query: prepared.query.clone(),
            headers: prepared.headers.clone(),
            body: prepared.body.clone(),
            timeout,
        };

        let response = match self.transport.send(http_request).await {
            Ok(response) => response,
            Err(err) => return Attempt::Retry(err.into(), None),
        };

        if !(200..300).contains(&response.status) {
            let retry_after = response.header("retry-after").and_then(parse_retry_after);
            let err = InatError::from_status(response.status, &prepared.url, response.body);
            return if err.is_retryable() {
                Attempt::Retry(err, retry_after)
            } else {
                Attempt::Fail(err)
            };
        }

        // Truncated bodies occasionally arrive with a 200 status
        match parse_body(&response.body) {
            Ok(body) => Attempt::Done(ApiResponse {
                status: response.status,
                headers: response.headers,
                text: response.body,
                body,
                source: ResponseSource::Network,
            }),
            Err(err) => Attempt::Retry(
                InatError::RequestFailed {
                    message: format!("Invalid JSON response from {}: {err}", prepared.url),
                    status: Some(response.status),
                    body: Some(response.body),
                },
                None,
            ),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// URL patterns from the config first, then the built-in ones
fn expiration_policy(config: &ClientConfig) -> Result<ExpirationPolicy> {
    let mut policy = ExpirationPolicy::new(config.expire_after);
    for (pattern, expiration) in default_cache_patterns() {
        policy = policy.with_pattern(&pattern, expiration)?;
    }
    let overrides = config
        .urls_expire_after
        .iter()
        .map(|(pattern, expiration)| (pattern.as_str(), *expiration));
    Ok(policy.with_overrides(overrides)?)
}

/// Rate-limit bucket for a URL: its host, so each API host has its own budget
fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| url.to_string())
}

fn backoff(factor: f64, attempt: u32) -> Duration {
    Duration::try_from_secs_f64(factor * 2f64.powi(attempt as i32)).unwrap_or(Duration::ZERO)
}

/// `Retry-After` as either delay seconds or an HTTP date
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some((date.with_timezone(&Utc) - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

fn string_field(body: &Value, field: &str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| InatError::authentication(format!("Token response has no {field}")))
}

/// Rejected credentials come back from the token endpoint as 400 or 401
fn token_error(err: InatError) -> InatError {
    match err {
        InatError::RequestFailed {
            status: Some(400),
            body,
            ..
        } => InatError::Authentication {
            message: "Invalid credentials".to_string(),
            status: Some(400),
            body,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::request::Method;
    use crate::testing::{session_with, test_config, test_session, FakeTransport};
    use crate::transport::{HttpResponse, TransportError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TAXA_URL: &str = "https://api.inaturalist.org/v1/taxa";

    #[tokio::test]
    async fn test_cached_get_skips_transport() {
        let transport = FakeTransport::json(json!({"total_results": 1, "results": [{"id": 1}]}));
        let session = test_session(transport.clone()).await;
        let request = || ApiRequest::get(TAXA_URL).param("q", "bombus").param("rank", "genus");

        let first = session.execute(request()).await.unwrap();
        let second = session.execute(request()).await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert_eq!(first.source, ResponseSource::Network);
        assert!(second.is_from_cache());
        assert_eq!(first.text, second.text);
    }

    #[tokio::test]
    async fn test_parameter_order_shares_cache_entry() {
        let transport = FakeTransport::json(json!({"results": []}));
        let session = test_session(transport.clone()).await;

        let a = Params::new().set("q", "bombus").set("rank", "genus");
        let b = Params::new().set("rank", "genus").set("q", "bombus");
        session.execute(ApiRequest::get(TAXA_URL).params(a)).await.unwrap();
        let second = session.execute(ApiRequest::get(TAXA_URL).params(b)).await.unwrap();

        assert!(second.is_from_cache());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache_and_replaces_entry() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&counter);
        let transport = FakeTransport::new(move |_| {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, json!({"n": n}).to_string()))
        });
        let session = test_session(transport.clone()).await;

        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        let refreshed = session.execute(ApiRequest::get(TAXA_URL).refresh(true)).await.unwrap();
        let cached = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();

        assert_eq!(transport.call_count(), 2);
        assert_eq!(refreshed.body["n"], 1);
        assert_eq!(cached.body["n"], 1);
        assert!(cached.is_from_cache());
    }

    #[tokio::test]
    async fn test_writes_are_not_cached() {
        let transport = FakeTransport::json(json!({"id": 1}));
        let session = test_session(transport.clone()).await;
        let url = "https://api.inaturalist.org/v1/observations";

        for _ in 0..2 {
            let request = ApiRequest::post(url).json(json!({"observation": {}})).access_token("token");
            session.execute(request).await.unwrap();
        }
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_do_not_cache_expiration() {
        let transport = FakeTransport::json(json!({}));
        let session = test_session(transport.clone()).await;

        for _ in 0..2 {
            let request = ApiRequest::get(TAXA_URL).expire_after(Expiration::DoNotCache);
            session.execute(request).await.unwrap();
        }
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_validation_error_without_network() {
        let transport = FakeTransport::json(json!({}));
        let session = test_session(transport.clone()).await;

        let request = ApiRequest::get("https://api.inaturalist.org/v1/observations")
            .param("quality_grade", "excellent")
            .authenticated();
        let err = session.execute(request).await.unwrap_err();

        assert!(matches!(err, InatError::Validation(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing_and_redacts() {
        let transport = FakeTransport::json(json!({}));
        let config = test_config().with_dry_run(true).with_access_token("secret-token");
        let session = session_with(config, transport.clone()).await;

        let request = ApiRequest::post("https://api.inaturalist.org/v1/observations")
            .json(json!({"observation": {"species_guess": "owl"}}))
            .authenticated();
        let response = session.execute(request).await.unwrap();

        assert_eq!(transport.call_count(), 0);
        assert!(response.is_dry_run());
        assert_eq!(response.body["id"], "placeholder-id");
        assert_eq!(response.body["total_results"], 0);

        let ResponseSource::DryRun(prepared) = &response.source else {
            panic!("expected a dry run");
        };
        let description = prepared.describe(true);
        assert!(description.starts_with("(DRY RUN) POST https://api.inaturalist.org/v1/observations"));
        assert!(description.contains("Authorization: [REDACTED]"));
        assert!(!description.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_dry_run_without_credentials_does_not_fail() {
        let transport = FakeTransport::json(json!({}));
        let mut config = test_config().with_dry_run(true);
        config.credentials = Default::default();
        let session = session_with(config, transport.clone()).await;

        let request = ApiRequest::delete("https://api.inaturalist.org/v1/observations/1").authenticated();
        let response = session.execute(request).await.unwrap();

        assert!(response.is_dry_run());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_write_only() {
        let transport = FakeTransport::json(json!({"results": []}));
        let config = test_config()
            .with_dry_run_write_only(true)
            .with_access_token("token");
        let session = session_with(config, transport.clone()).await;

        let read = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        let write = session
            .execute(ApiRequest::put("https://api.inaturalist.org/v1/observations/1").authenticated())
            .await
            .unwrap();

        assert!(!read.is_dry_run());
        assert!(write.is_dry_run());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_headers_in_order() {
        let transport = FakeTransport::json(json!({}));
        let config = test_config().with_user_agent("my-app/1.0").with_access_token("token");
        let session = session_with(config, transport.clone()).await;

        let request = ApiRequest::get(TAXA_URL)
            .header("X-HTTP-Method-Override", "GET")
            .authenticated();
        session.execute(request).await.unwrap();

        let call = &transport.calls()[0];
        let names: Vec<&str> = call.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Accept", "User-Agent", "X-HTTP-Method-Override", "Authorization"]);
        assert_eq!(call.header("authorization"), Some("Bearer token"));
        assert!(call.header("user-agent").unwrap().ends_with(" my-app/1.0"));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&counter);
        let transport = FakeTransport::new(move |_| match counted.fetch_add(1, Ordering::SeqCst) {
            0 => Err(TransportError::Timeout("slow".into())),
            1 => Ok(HttpResponse::new(503, "unavailable")),
            _ => Ok(HttpResponse::new(200, r#"{"ok": true}"#)),
        });
        let session = test_session(transport.clone()).await;

        let response = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        assert_eq!(response.body["ok"], true);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_json_is_retried() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&counter);
        let transport = FakeTransport::new(move |_| match counted.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(HttpResponse::new(200, r#"{"results": [{"id": 1"#)),
            _ => Ok(HttpResponse::new(200, r#"{"results": [{"id": 1}]}"#)),
        });
        let session = test_session(transport.clone()).await;

        let response = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        assert_eq!(response.body["results"][0]["id"], 1);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let transport = FakeTransport::new(|_| Ok(HttpResponse::new(429, "slow down")));
        let session = test_session(transport.clone()).await;

        let err = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap_err();
        assert!(matches!(err, InatError::RateLimitExceeded { status: Some(429), .. }));
        assert_eq!(err.body(), Some("slow down"));
        assert_eq!(transport.call_count(), 3);

        let transport = FakeTransport::new(|_| Err(TransportError::Connect("refused".into())));
        let session = test_session(transport.clone()).await;
        let err = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap_err();
        assert!(matches!(err, InatError::RequestFailed { status: None, .. }));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately() {
        for (status, expected) in [(401, "auth"), (403, "auth"), (404, "not found"), (422, "failed")] {
            let transport = FakeTransport::new(move |_| Ok(HttpResponse::new(status, "{}")));
            let session = test_session(transport.clone()).await;

            let err = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap_err();
            let kind = match &err {
                InatError::Authentication { .. } => "auth",
                InatError::NotFound { .. } => "not found",
                InatError::RequestFailed { .. } => "failed",
                _ => "other",
            };
            assert_eq!(kind, expected, "status {status} gave {err:?}");
            assert_eq!(err.status(), Some(status));
            assert_eq!(transport.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let transport = FakeTransport::json(json!({}));
        let mut config = test_config();
        config.credentials = Default::default();
        config.api_v0_url = "https://inat.invalid".to_string();
        let session = session_with(config, transport.clone()).await;

        // Credentials could still come from INAT_* variables in the environment
        if crate::auth::Credentials::from_env().is_complete() {
            return;
        }
        let request = ApiRequest::post("https://api.inaturalist.org/v1/observations").authenticated();
        let err = session.execute(request).await.unwrap_err();

        assert!(matches!(err, InatError::Authentication { .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_token_exchange() {
        let transport = FakeTransport::new(|request| {
            let body = match request.url.as_str() {
                "https://www.inaturalist.org/oauth/token" => json!({"access_token": "oauth-token"}),
                "https://www.inaturalist.org/users/api_token" => {
                    assert_eq!(request.header("authorization"), Some("Bearer oauth-token"));
                    json!({"api_token": "jwt-token"})
                }
                _ => json!({"id": 1}),
            };
            Ok(HttpResponse::new(200, body.to_string()))
        });
        let session = test_session(transport.clone()).await;

        for _ in 0..2 {
            let request = ApiRequest::post("https://api.inaturalist.org/v1/observations")
                .json(json!({"observation": {}}))
                .authenticated();
            session.execute(request).await.unwrap();
        }

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].method, Method::Post);
        let Some(crate::request::RequestBody::Json(body)) = &calls[0].body else {
            panic!("expected a JSON body");
        };
        assert_eq!(body["grant_type"], "password");
        assert_eq!(body["client_secret"], "app-secret");
        assert_eq!(calls[2].header("authorization"), Some("Bearer jwt-token"));
        assert_eq!(calls[3].header("authorization"), Some("Bearer jwt-token"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let transport = FakeTransport::new(|_| Ok(HttpResponse::new(400, r#"{"error":"invalid_grant"}"#)));
        let session = test_session(transport.clone()).await;

        let err = session.access_token().await.unwrap_err();
        assert!(matches!(err, InatError::Authentication { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_fresh_request_versions() {
        let transport = FakeTransport::json(json!({}));
        let session = test_session(transport).await;
        let url = "https://api.inaturalist.org/v1/projects/1";

        let first = session.fresh(ApiRequest::get(url), "/projects/1").await.unwrap();
        let second = session.fresh(ApiRequest::get(url), "/projects/1").await.unwrap();
        let other = session.fresh(ApiRequest::get(url), "/projects/2").await.unwrap();

        assert!(first.refresh);
        assert!(!first.params.contains("v"));
        assert_eq!(second.params.get("v").and_then(|v| v.to_wire()).as_deref(), Some("1"));
        assert!(!other.params.contains("v"));
    }

    #[tokio::test]
    async fn test_persistent_cache_survives_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config().with_cache_dir(dir.path());

        let transport = FakeTransport::json(json!({"results": [{"id": 7}]}));
        let session = session_with(config.clone(), transport.clone()).await;
        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();

        let transport = FakeTransport::json(json!({}));
        let session = session_with(config, transport.clone()).await;
        let response = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();

        assert!(response.is_from_cache());
        assert_eq!(response.body["results"][0]["id"], 7);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_delay_exceeded() {
        let transport = FakeTransport::json(json!({}));
        let config = test_config()
            .with_rate_limits(0.0, 1.0, 0.0)
            .with_max_delay(Duration::from_millis(100))
            .with_cache_enabled(false);
        let session = session_with(config, transport.clone()).await;

        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        let err = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap_err();

        assert!(matches!(err, InatError::RateLimitExceeded { status: None, .. }));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_expiration_policy_order() {
        let config = test_config().with_url_expiration("api.inaturalist.org/v1/taxa*", Expiration::minutes(1));
        let policy = expiration_policy(&config).unwrap();

        assert_eq!(policy.expiration_for("https://api.inaturalist.org/v1/taxa/1"), Expiration::minutes(1));
        assert_eq!(policy.expiration_for("https://api.inaturalist.org/v1/places/1"), Expiration::days(7));
        assert_eq!(
            policy.expiration_for("https://api.inaturalist.org/v1/taxa/autocomplete"),
            Expiration::minutes(1)
        );
        assert_eq!(
            policy.expiration_for("https://api.inaturalist.org/v1/observations"),
            Expiration::minutes(30)
        );
    }

    #[tokio::test]
    async fn test_configured_rate_paces_requests() {
        let transport = FakeTransport::json(json!({}));
        let config = test_config()
            .with_rate_limits(2.0, 0.0, 0.0)
            .with_cache_enabled(false);
        let session = session_with(config, transport.clone()).await;
        let started = Instant::now();

        for _ in 0..5 {
            session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test]
    async fn test_retry_after_header_sets_delay() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&counter);
        let transport = FakeTransport::new(move |_| match counted.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(HttpResponse::new(429, "slow down").with_header("Retry-After", "1")),
            _ => Ok(HttpResponse::new(200, r#"{"ok": true}"#)),
        });
        // Backoff alone would retry at once
        let session = test_session(transport.clone()).await;
        let started = Instant::now();

        let response = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();

        assert_eq!(response.body["ok"], true);
        assert_eq!(transport.call_count(), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[tokio::test]
    async fn test_cache_control_no_store() {
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse::new(200, "{}").with_header("Cache-Control", "private, no-store"))
        });
        let session = test_session(transport.clone()).await;

        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        let second = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();

        assert!(!second.is_from_cache());
        assert_eq!(transport.call_count(), 2);

        // Ignored when turned off
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse::new(200, "{}").with_header("Cache-Control", "no-store"))
        });
        let session = session_with(test_config().with_cache_control(false), transport.clone()).await;
        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        assert!(session.execute(ApiRequest::get(TAXA_URL)).await.unwrap().is_from_cache());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_control_max_age() {
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse::new(200, "{}").with_header("Cache-Control", "max-age=1"))
        });
        let session = test_session(transport.clone()).await;

        session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        assert!(session.execute(ApiRequest::get(TAXA_URL)).await.unwrap().is_from_cache());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let expired = session.execute(ApiRequest::get(TAXA_URL)).await.unwrap();
        assert!(!expired.is_from_cache());
        assert_eq!(transport.call_count(), 2);
    }

    /// First call succeeds, every later call fails with 503
    fn flaky_transport() -> Arc<FakeTransport> {
        let counter = Arc::new(AtomicUsize::new(0));
        FakeTransport::new(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(HttpResponse::new(200, r#"{"results": [{"id": 7}]}"#)),
            _ => Ok(HttpResponse::new(503, "unavailable")),
        })
    }

    #[tokio::test]
    async fn test_stale_response_served_on_error() {
        let transport = flaky_transport();
        let session = test_session(transport.clone()).await;
        let request = || ApiRequest::get(TAXA_URL).expire_after(Expiration::After(Duration::from_millis(50)));

        session.execute(request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = session.execute(request()).await.unwrap();

        assert!(response.is_from_cache());
        assert_eq!(response.body["results"][0]["id"], 7);
        // One success, then the initial attempt and two retries
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_stale_response_disabled() {
        let transport = flaky_transport();
        let session = session_with(test_config().with_stale_if_error(false), transport.clone()).await;
        let request = || ApiRequest::get(TAXA_URL).expire_after(Expiration::After(Duration::from_millis(50)));

        session.execute(request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = session.execute(request()).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_expired_entry_not_served_when_request_succeeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&counter);
        let transport = FakeTransport::new(move |_| {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, json!({"n": n}).to_string()))
        });
        let session = test_session(transport.clone()).await;
        let request = || ApiRequest::get(TAXA_URL).expire_after(Expiration::After(Duration::from_millis(50)));

        session.execute(request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = session.execute(request()).await.unwrap();

        assert!(!response.is_from_cache());
        assert_eq!(response.body["n"], 1);
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff(0.5, 0), Duration::from_millis(500));
        assert_eq!(backoff(0.5, 3), Duration::from_secs(4));
        assert_eq!(backoff(-1.0, 1), Duration::ZERO);
        assert_eq!(host_of("https://api.inaturalist.org/v1/taxa"), "api.inaturalist.org");
    }
}
