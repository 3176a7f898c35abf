//! Credentials for the password-grant OAuth flow
//!
//! Credentials are resolved field by field from three sources, first match wins: values set
//! explicitly in [`ClientConfig`](crate::ClientConfig), the `INAT_*` environment variables, and
//! a [`CredentialStore`] such as the system keyring.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::constants::CREDENTIAL_SERVICE;
use crate::error::{InatError, Result};

const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const APP_ID: &str = "app_id";
const APP_SECRET: &str = "app_secret";

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    /// OAuth application ID
    pub app_id: Option<String>,
    /// OAuth application secret
    pub app_secret: Option<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            app_id: Some(app_id.into()),
            app_secret: Some(app_secret.into()),
        }
    }

    /// Read `INAT_USERNAME`, `INAT_PASSWORD`, `INAT_APP_ID` and `INAT_APP_SECRET`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            username: var("INAT_USERNAME"),
            password: var("INAT_PASSWORD"),
            app_id: var("INAT_APP_ID"),
            app_secret: var("INAT_APP_SECRET"),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_some())
    }

    /// Fill in fields that are still unset from `other`
    pub fn merge_missing(&mut self, other: Credentials) {
        self.username = self.username.take().or(other.username);
        self.password = self.password.take().or(other.password);
        self.app_id = self.app_id.take().or(other.app_id);
        self.app_secret = self.app_secret.take().or(other.app_secret);
    }

    /// Body of the `/oauth/token` password grant
    pub(crate) fn token_request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.username,
            "password": self.password,
            "client_id": self.app_id,
            "client_secret": self.app_secret,
            "grant_type": "password",
        })
    }

    fn fields(&self) -> [(&'static str, &Option<String>); 4] {
        [
            (USERNAME, &self.username),
            (PASSWORD, &self.password),
            (APP_ID, &self.app_id),
            (APP_SECRET, &self.app_secret),
        ]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("app_id", &self.app_id)
            .field("app_secret", &redact(&self.app_secret))
            .finish()
    }
}

/// A secret store keyed by service and key, such as the system keyring
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, service: &str, key: &str) -> Result<Option<String>>;

    async fn set(&self, service: &str, key: &str, secret: &str) -> Result<()>;
}

/// Process-local credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<(String, String), String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|_| InatError::CredentialStore("credential store lock poisoned".into()))?;
        Ok(secrets.get(&(service.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, service: &str, key: &str, secret: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| InatError::CredentialStore("credential store lock poisoned".into()))?;
        secrets.insert((service.to_string(), key.to_string()), secret.to_string());
        Ok(())
    }
}

/// Read all four credentials from a store under the `/inaturalist` service
pub async fn load_credentials(store: &dyn CredentialStore) -> Result<Credentials> {
    Ok(Credentials {
        username: store.get(CREDENTIAL_SERVICE, USERNAME).await?,
        password: store.get(CREDENTIAL_SERVICE, PASSWORD).await?,
        app_id: store.get(CREDENTIAL_SERVICE, APP_ID).await?,
        app_secret: store.get(CREDENTIAL_SERVICE, APP_SECRET).await?,
    })
}

/// Save credentials to a store for later sessions; unset fields are skipped
pub async fn store_credentials(store: &dyn CredentialStore, credentials: &Credentials) -> Result<()> {
    for (key, value) in credentials.fields() {
        if let Some(value) = value {
            store.set(CREDENTIAL_SERVICE, key, value).await?;
        }
    }
    Ok(())
}

/// Resolve complete credentials from the explicit values, the environment, then the store
///
/// Store failures are logged and treated as missing values.
pub(crate) async fn resolve_credentials(
    explicit: &Credentials,
    store: Option<&dyn CredentialStore>,
) -> Result<Credentials> {
    resolve_with(explicit, Credentials::from_env(), store).await
}

async fn resolve_with(
    explicit: &Credentials,
    from_env: Credentials,
    store: Option<&dyn CredentialStore>,
) -> Result<Credentials> {
    let mut credentials = explicit.clone();
    credentials.merge_missing(from_env);

    if !credentials.is_complete() {
        if let Some(store) = store {
            match load_credentials(store).await {
                Ok(stored) => {
                    credentials.merge_missing(stored);
                    if credentials.is_complete() {
                        info!("Retrieved credentials from credential store");
                    }
                }
                Err(err) => warn!(error = %err, "Failed to read credential store"),
            }
        }
    }

    if credentials.is_complete() {
        Ok(credentials)
    } else {
        Err(InatError::authentication(
            "Not all authentication parameters were provided",
        ))
    }
}
