use std::sync::Arc;

use serde_json::Value;

use super::{fetch_all, fetch_by_ids, fetch_one, field_selection_request, ids_url};
use crate::error::Result;
use crate::models::Taxon;
use crate::paginator::Paginator;
use crate::params::Params;
use crate::request::ApiRequest;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Taxa {
    session: Arc<Session>,
}

impl Taxa {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self) -> &str {
        &self.session.config().api_v1_url
    }

    /// A taxon with its full ancestry and children
    pub async fn get(&self, id: u64) -> Result<Taxon> {
        let request = ApiRequest::get(ids_url(self.v1(), "taxa", &[id])?);
        fetch_one(&self.session, request).await
    }

    pub async fn by_ids(&self, ids: &[u64]) -> Result<Vec<Taxon>> {
        fetch_by_ids(&self.session, ids, |batch| {
            Ok(ApiRequest::get(ids_url(self.v1(), "taxa", batch)?))
        })
        .await
    }

    /// Search taxa; `min_rank`/`max_rank` expand to the ranks between them
    pub fn search(&self, params: Params) -> Paginator<Taxon> {
        let request = ApiRequest::get(format!("{}/taxa", self.v1())).params(params);
        Paginator::new(Arc::clone(&self.session), request)
    }

    /// Name completion; one page of the best matches
    pub async fn autocomplete(&self, q: &str, params: Params) -> Result<Vec<Taxon>> {
        let request = ApiRequest::get(format!("{}/taxa/autocomplete", self.v1()))
            .params(params)
            .param("q", q);
        fetch_all(&self.session, request).await
    }

    /// Search the v2 API, optionally selecting which response fields to return
    pub fn search_v2(&self, params: Params, fields: Option<Value>) -> Paginator<Taxon> {
        let url = format!("{}/taxa", self.session.config().api_v2_url);
        let request = match fields {
            Some(fields) => field_selection_request(url, fields),
            None => ApiRequest::get(url),
        }
        .params(params);
        Paginator::new(Arc::clone(&self.session), request).id_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InatError;
    use crate::testing::{test_session, FakeTransport};
    use crate::transport::HttpResponse;
    use serde_json::json;

    #[tokio::test]
    async fn test_get() {
        let transport = FakeTransport::json(json!({
            "total_results": 1,
            "results": [{"id": 70118, "name": "Nicrophorus vespilloides", "rank": "species"}],
        }));
        let taxa = Taxa::new(test_session(transport.clone()).await);

        let taxon = taxa.get(70118).await.unwrap();

        assert_eq!(taxon.name.as_deref(), Some("Nicrophorus vespilloides"));
        assert_eq!(transport.calls()[0].url, "https://api.inaturalist.org/v1/taxa/70118");
    }

    #[tokio::test]
    async fn test_by_ids_requires_ids() {
        let transport = FakeTransport::json(json!({}));
        let taxa = Taxa::new(test_session(transport.clone()).await);

        assert!(matches!(taxa.by_ids(&[]).await, Err(InatError::Validation(_))));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_by_ids_in_batches_of_thirty() {
        let transport = FakeTransport::new(|request| {
            let ids = request.url.rsplit('/').next().unwrap().to_string();
            let results: Vec<_> = ids.split(',').map(|id| json!({"id": id.parse::<u64>().unwrap()})).collect();
            Ok(HttpResponse::new(200, json!({"results": results}).to_string()))
        });
        let taxa = Taxa::new(test_session(transport.clone()).await);
        let ids: Vec<u64> = (1..=75).collect();

        let results = taxa.by_ids(&ids).await.unwrap();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(results.len(), 75);
        assert_eq!(results.iter().map(|t| t.id).collect::<Vec<_>>(), ids);
        let calls = transport.calls();
        assert!(calls[2].url.ends_with("/taxa/61,62,63,64,65,66,67,68,69,70,71,72,73,74,75"));
    }

    #[tokio::test]
    async fn test_search_expands_rank_range() {
        let transport = FakeTransport::json(json!({"total_results": 0, "results": []}));
        let taxa = Taxa::new(test_session(transport.clone()).await);

        let results = taxa
            .search(Params::new().set("q", "vespi").set("min_rank", "genus").set("max_rank", "family"))
            .all()
            .await
            .unwrap();

        assert!(results.is_empty());
        let call = &transport.calls()[0];
        assert_eq!(call.query_param("rank"), Some("genus,subtribe,tribe,supertribe,subfamily,family"));
        assert_eq!(call.query_param("min_rank"), None);
    }

    #[tokio::test]
    async fn test_autocomplete() {
        let transport = FakeTransport::json(json!({
            "total_results": 2,
            "results": [{"id": 1, "name": "Vespidae"}, {"id": 2, "name": "Vespa"}],
        }));
        let taxa = Taxa::new(test_session(transport.clone()).await);

        let results = taxa.autocomplete("vesp", Params::new()).await.unwrap();

        assert_eq!(results.len(), 2);
        let call = &transport.calls()[0];
        assert_eq!(call.url, "https://api.inaturalist.org/v1/taxa/autocomplete");
        assert_eq!(call.query_param("q"), Some("vesp"));
    }
}
