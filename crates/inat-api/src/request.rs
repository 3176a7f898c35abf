//! API requests, prepared requests and responses

use std::time::Duration;

use response_cache::{CachedResponse, Expiration};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::error::{InatError, Result};
use crate::params::{ParamValue, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods that modify remote data
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    /// Bytes that identify the body in a request signature
    pub(crate) fn signature_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Json(value) => serde_json::to_vec(value).ok(),
            Self::Multipart(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

/// A request to one API endpoint
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub params: Params,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    /// Resolve an access token through the credential chain before sending
    pub auth_required: bool,
    /// Token to send instead of resolving one
    pub access_token: Option<String>,
    /// Skip the cache read; the fresh response still replaces the cached one
    pub refresh: bool,
    /// `Some(true)` forces a dry run, `Some(false)` forces a real request, `None` follows
    /// the session configuration
    pub dry_run: Option<bool>,
    pub expire_after: Option<Expiration>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            body: None,
            headers: Vec::new(),
            auth_required: false,
            access_token: None,
            refresh: false,
            dry_run: None,
            expire_after: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Some(RequestBody::Multipart(parts));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.auth_required = true;
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    pub fn expire_after(mut self, expiration: Expiration) -> Self {
        self.expire_after = Some(expiration);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the request modifies remote data; a POST overridden to GET is a read
    pub fn is_write(&self) -> bool {
        let read_override = self.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case(METHOD_OVERRIDE_HEADER) && value.eq_ignore_ascii_case("GET")
        });
        self.method.is_write() && !read_override
    }
}

/// Lets a search be sent as POST when its parameters are too large for a URL
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

const REDACTED: &str = "[REDACTED]";
const REDACTED_BODY_KEYS: &[&str] = &["password", "client_secret"];

/// A request with its final URL, query and headers, ready to send or describe
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Headers in sending order
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl PreparedRequest {
    /// URL including the query string
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        match Url::parse(&self.url) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(&self.query);
                url.to_string()
            }
            Err(_) => {
                let query: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{}?{}", self.url, query.join("&"))
            }
        }
    }

    /// Render the request for logs, with credentials redacted
    ///
    /// ```text
    /// (DRY RUN) POST https://api.inaturalist.org/v1/observations
    /// Accept: application/json
    /// User-Agent: inat-api/0.1.0
    /// Authorization: [REDACTED]
    /// {"observation":{"species_guess":"owl"}}
    /// ```
    pub fn describe(&self, dry_run: bool) -> String {
        let mut lines = vec![format!(
            "{}{} {}",
            if dry_run { "(DRY RUN) " } else { "" },
            self.method,
            self.full_url()
        )];
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("authorization") {
                lines.push(format!("{name}: {REDACTED}"));
            } else {
                lines.push(format!("{name}: {value}"));
            }
        }
        match &self.body {
            Some(RequestBody::Json(body)) => lines.push(redact_body(body).to_string()),
            Some(RequestBody::Multipart(_)) => lines.push("(non-JSON request body)".to_string()),
            None => {}
        }
        lines.join("\n")
    }
}

fn redact_body(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if REDACTED_BODY_KEYS.contains(&key.as_str()) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact_body(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_body).collect()),
        other => other.clone(),
    }
}

/// Where a response came from
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Not sent; holds the request that would have been
    DryRun(PreparedRequest),
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Raw response body
    pub text: String,
    /// Parsed body; `Null` for an empty body
    pub body: Value,
    pub source: ResponseSource,
}

impl ApiResponse {
    pub(crate) fn dry_run(prepared: PreparedRequest) -> Self {
        let body = json!({
            "results": [],
            "total_results": 0,
            "access_token": "",
            "id": "placeholder-id",
        });
        Self {
            status: 200,
            headers: Vec::new(),
            text: body.to_string(),
            body,
            source: ResponseSource::DryRun(prepared),
        }
    }

    pub(crate) fn from_cache(entry: &CachedResponse) -> Result<Self> {
        Ok(Self {
            status: entry.status,
            headers: entry.headers.clone(),
            text: entry.body.clone(),
            body: parse_body(&entry.body)?,
            source: ResponseSource::Cache,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.source, ResponseSource::DryRun(_))
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Total result count from the JSON envelope or the v0 `X-Total-Entries` header
    pub fn total_results(&self) -> Option<u64> {
        self.body
            .get("total_results")
            .and_then(Value::as_u64)
            .or_else(|| self.header("x-total-entries")?.trim().parse().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

pub(crate) fn parse_body(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(InatError::from)
}
