use std::sync::Arc;

use crate::models::SearchResult;
use crate::paginator::Paginator;
use crate::params::Params;
use crate::request::ApiRequest;
use crate::session::Session;

/// Site-wide search across taxa, places, projects and users
#[derive(Debug, Clone)]
pub struct Search {
    session: Arc<Session>,
}

impl Search {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Narrow the record types with a `sources` param
    pub fn query(&self, q: &str, params: Params) -> Paginator<SearchResult> {
        let url = format!("{}/search", self.session.config().api_v1_url);
        let request = ApiRequest::get(url).params(params).param("q", q);
        Paginator::new(Arc::clone(&self.session), request)
    }
}
