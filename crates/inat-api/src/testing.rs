//! Test doubles shared by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// In-process transport that answers with a handler and records every request
pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answer every request with 200 and the same JSON body
    pub fn json(body: Value) -> Arc<Self> {
        let text = body.to_string();
        Self::new(move |_| Ok(HttpResponse::new(200, text.clone())))
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = (self.handler)(&request);
        self.calls.lock().unwrap().push(request);
        response
    }
}

/// In-memory config with rate limits off, instant retries and complete credentials
pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::in_memory()
        .with_rate_limits(0.0, 0.0, 0.0)
        .with_retries(2, 0.0)
        .with_credentials(Credentials::new("naturalist", "hunter2", "app-id", "app-secret"))
}

pub(crate) async fn test_session(transport: Arc<FakeTransport>) -> Arc<Session> {
    session_with(test_config(), transport).await
}

pub(crate) async fn session_with(config: ClientConfig, transport: Arc<FakeTransport>) -> Arc<Session> {
    Arc::new(Session::with_transport(config, transport).await.unwrap())
}
