use std::sync::Arc;

use super::fetch_all;
use crate::error::{InatError, Result};
use crate::models::ControlledTerm;
use crate::request::ApiRequest;
use crate::session::Session;

/// Annotation terms ("Life Stage", "Sex", ...) and their allowed values
#[derive(Debug, Clone)]
pub struct ControlledTerms {
    session: Arc<Session>,
}

impl ControlledTerms {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn all(&self) -> Result<Vec<ControlledTerm>> {
        let url = format!("{}/controlled_terms", self.session.config().api_v1_url);
        fetch_all(&self.session, ApiRequest::get(url)).await
    }

    /// Terms that apply to a taxon; an unknown taxon is [`InatError::NotFound`]
    pub async fn for_taxon(&self, taxon_id: u64) -> Result<Vec<ControlledTerm>> {
        let url = format!("{}/controlled_terms/for_taxon", self.session.config().api_v1_url);
        let request = ApiRequest::get(url.as_str()).param("taxon_id", taxon_id);
        // Unknown taxa are answered with 422 rather than 404
        match fetch_all(&self.session, request).await {
            Err(InatError::RequestFailed {
                status: Some(422),
                body,
                ..
            }) => Err(InatError::NotFound { url, body }),
            result => result,
        }
    }
}
