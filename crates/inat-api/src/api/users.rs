use std::sync::Arc;

use super::{fetch_all, fetch_one};
use crate::error::{InatError, Result};
use crate::models::User;
use crate::params::Params;
use crate::request::ApiRequest;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Users {
    session: Arc<Session>,
}

impl Users {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self, path: &str) -> String {
        format!("{}/{path}", self.session.config().api_v1_url)
    }

    /// Look up a user by numeric ID or login
    pub async fn get(&self, id_or_login: &str) -> Result<User> {
        let id_or_login = id_or_login.trim();
        if id_or_login.is_empty() || id_or_login.contains(['/', '?', '#']) {
            return Err(InatError::Validation(format!("Invalid user ID or login: {id_or_login:?}")));
        }
        fetch_one(&self.session, ApiRequest::get(self.v1(&format!("users/{id_or_login}")))).await
    }

    /// The authenticated user; never served from the cache
    pub async fn me(&self) -> Result<User> {
        let request = ApiRequest::get(self.v1("users/me")).authenticated().refresh(true);
        fetch_one(&self.session, request).await
    }

    pub async fn autocomplete(&self, q: &str, params: Params) -> Result<Vec<User>> {
        let request = ApiRequest::get(self.v1("users/autocomplete")).params(params).param("q", q);
        fetch_all(&self.session, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_with, test_config, test_session, FakeTransport};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_by_login() {
        let transport = FakeTransport::json(json!({"results": [{"id": 1, "login": "kueda", "name": "Ken-ichi"}]}));
        let users = Users::new(test_session(transport.clone()).await);

        let user = users.get("kueda").await.unwrap();

        assert_eq!(user.display_name(), "kueda (Ken-ichi)");
        assert_eq!(transport.calls()[0].url, "https://api.inaturalist.org/v1/users/kueda");
    }

    #[tokio::test]
    async fn test_get_rejects_path_characters() {
        let transport = FakeTransport::json(json!({}));
        let users = Users::new(test_session(transport.clone()).await);

        assert!(matches!(users.get("me/../1").await, Err(InatError::Validation(_))));
        assert!(matches!(users.get(" ").await, Err(InatError::Validation(_))));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_me_is_authenticated_and_uncached() {
        let transport = FakeTransport::json(json!({"results": [{"id": 7, "login": "naturalist"}]}));
        let config = test_config().with_access_token("token");
        let users = Users::new(session_with(config, transport.clone()).await);

        users.me().await.unwrap();
        let user = users.me().await.unwrap();

        assert_eq!(user.id, 7);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls()[0].header("authorization"), Some("Bearer token"));
    }

    #[tokio::test]
    async fn test_autocomplete() {
        let transport = FakeTransport::json(json!({"results": [{"id": 1, "login": "kueda"}]}));
        let users = Users::new(test_session(transport.clone()).await);

        let results = users.autocomplete("kue", Params::new().set("per_page", 5)).await.unwrap();

        assert_eq!(results.len(), 1);
        let call = &transport.calls()[0];
        assert_eq!(call.query_param("q"), Some("kue"));
        assert_eq!(call.query_param("per_page"), Some("5"));
    }
}
