use std::sync::Arc;

use super::{fetch_by_ids, fetch_one, ids_url};
use crate::error::Result;
use crate::models::Identification;
use crate::paginator::Paginator;
use crate::params::Params;
use crate::request::ApiRequest;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Identifications {
    session: Arc<Session>,
}

impl Identifications {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self) -> &str {
        &self.session.config().api_v1_url
    }

    pub fn search(&self, params: Params) -> Paginator<Identification> {
        let request = ApiRequest::get(format!("{}/identifications", self.v1())).params(params);
        Paginator::new(Arc::clone(&self.session), request)
    }

    pub async fn get(&self, id: u64) -> Result<Identification> {
        let request = ApiRequest::get(ids_url(self.v1(), "identifications", &[id])?);
        fetch_one(&self.session, request).await
    }

    pub async fn by_ids(&self, ids: &[u64]) -> Result<Vec<Identification>> {
        fetch_by_ids(&self.session, ids, |batch| {
            Ok(ApiRequest::get(ids_url(self.v1(), "identifications", batch)?))
        })
        .await
    }
}
