//! Entry point bundling one session with every endpoint handle

use std::sync::Arc;

use crate::api::{
    ControlledTerms, Identifications, ObservationFields, Observations, Places, Projects, Search, Taxa, Users,
};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::Model;
use crate::paginator::Paginator;
use crate::request::{ApiRequest, ApiResponse};
use crate::session::Session;
use crate::transport::Transport;

/// Client for the iNaturalist API
///
/// Cloning is cheap; clones share the session and with it the cache, the rate limiter and
/// the access token.
#[derive(Debug, Clone)]
pub struct InatClient {
    session: Arc<Session>,
}

impl InatClient {
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::from_session(Session::new(config).await?))
    }

    /// Client configured from `INAT_*` and `DRY_RUN_*` environment variables
    pub async fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()).await
    }

    pub async fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self::from_session(Session::with_transport(config, transport).await?))
    }

    pub fn from_session(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn observations(&self) -> Observations {
        Observations::new(Arc::clone(&self.session))
    }

    pub fn taxa(&self) -> Taxa {
        Taxa::new(Arc::clone(&self.session))
    }

    pub fn places(&self) -> Places {
        Places::new(Arc::clone(&self.session))
    }

    pub fn users(&self) -> Users {
        Users::new(Arc::clone(&self.session))
    }

    pub fn projects(&self) -> Projects {
        Projects::new(Arc::clone(&self.session))
    }

    pub fn identifications(&self) -> Identifications {
        Identifications::new(Arc::clone(&self.session))
    }

    pub fn controlled_terms(&self) -> ControlledTerms {
        ControlledTerms::new(Arc::clone(&self.session))
    }

    pub fn observation_fields(&self) -> ObservationFields {
        ObservationFields::new(Arc::clone(&self.session))
    }

    pub fn search(&self) -> Search {
        Search::new(Arc::clone(&self.session))
    }

    /// Send a request to an endpoint without a dedicated handle
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.session.execute(request).await
    }

    /// Page through any search endpoint
    pub fn paginate<T: Model>(&self, request: ApiRequest) -> Paginator<T> {
        Paginator::new(Arc::clone(&self.session), request)
    }
}
