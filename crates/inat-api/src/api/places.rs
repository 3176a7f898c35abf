use std::collections::HashSet;
use std::sync::Arc;

use super::{fetch_all, fetch_by_ids, fetch_one, ids_url};
use crate::constants::AUTOCOMPLETE_PER_PAGE;
use crate::error::Result;
use crate::models::{NearbyPlaces, Place};
use crate::paginator::Paginator;
use crate::params::Params;
use crate::request::ApiRequest;
use crate::session::Session;

/// A bounding box in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub nelat: f64,
    pub nelng: f64,
    pub swlat: f64,
    pub swlng: f64,
}

#[derive(Debug, Clone)]
pub struct Places {
    session: Arc<Session>,
}

impl Places {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self) -> &str {
        &self.session.config().api_v1_url
    }

    pub async fn get(&self, id: u64) -> Result<Place> {
        let request = ApiRequest::get(ids_url(self.v1(), "places", &[id])?);
        fetch_one(&self.session, request).await
    }

    pub async fn by_ids(&self, ids: &[u64]) -> Result<Vec<Place>> {
        fetch_by_ids(&self.session, ids, |batch| {
            Ok(ApiRequest::get(ids_url(self.v1(), "places", batch)?))
        })
        .await
    }

    /// One page of name matches in the API's own ranking
    pub fn autocomplete(&self, q: &str) -> Paginator<Place> {
        Paginator::new(Arc::clone(&self.session), self.autocomplete_request(q))
    }

    /// As many name matches as the endpoint will give
    ///
    /// The endpoint returns a single page, and a broad query can push the wanted place off
    /// it. Asking again ranked by area usually turns up a different set, so both rankings are
    /// fetched and merged without duplicates, in the order first seen.
    pub async fn autocomplete_all(&self, q: &str) -> Result<Vec<Place>> {
        let mut places: Vec<Place> = fetch_all(&self.session, self.autocomplete_request(q)).await?;
        let by_area: Vec<Place> =
            fetch_all(&self.session, self.autocomplete_request(q).param("order_by", "area")).await?;

        let mut seen: HashSet<u64> = places.iter().map(|p| p.id).collect();
        places.extend(by_area.into_iter().filter(|p| seen.insert(p.id)));
        Ok(places)
    }

    fn autocomplete_request(&self, q: &str) -> ApiRequest {
        ApiRequest::get(format!("{}/places/autocomplete", self.v1()))
            .param("q", q)
            .param("per_page", AUTOCOMPLETE_PER_PAGE)
    }

    /// Places that overlap a bounding box, optionally filtered by name
    pub async fn nearby(&self, bbox: BoundingBox, name: Option<&str>) -> Result<NearbyPlaces> {
        let mut params = Params::new()
            .set("nelat", bbox.nelat)
            .set("nelng", bbox.nelng)
            .set("swlat", bbox.swlat)
            .set("swlng", bbox.swlng);
        if let Some(name) = name {
            params.insert("name", name);
        }
        let request = ApiRequest::get(format!("{}/places/nearby", self.v1())).params(params);
        let response = self.session.execute(request).await?;
        NearbyPlaces::from_json(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_session, FakeTransport};
    use crate::transport::HttpResponse;
    use serde_json::json;

    #[tokio::test]
    async fn test_by_ids() {
        let transport = FakeTransport::json(json!({
            "total_results": 2,
            "results": [{"id": 93735, "name": "Springbok"}, {"id": 89191, "name": "Conservation Area Riversdale"}],
        }));
        let places = Places::new(test_session(transport.clone()).await);

        let results = places.by_ids(&[93735, 89191]).await.unwrap();

        assert_eq!(results[1].name.as_deref(), Some("Conservation Area Riversdale"));
        assert_eq!(transport.calls()[0].url, "https://api.inaturalist.org/v1/places/93735,89191");
    }

    #[tokio::test]
    async fn test_by_ids_batches_long_lists() {
        let transport = FakeTransport::new(|request| {
            let ids = request.url.rsplit('/').next().unwrap().to_string();
            let results: Vec<_> = ids.split(',').map(|id| json!({"id": id.parse::<u64>().unwrap()})).collect();
            Ok(HttpResponse::new(200, json!({"results": results}).to_string()))
        });
        let places = Places::new(test_session(transport.clone()).await);
        let ids: Vec<u64> = (1..=75).collect();

        let results = places.by_ids(&ids).await.unwrap();

        let calls = transport.calls();
        let batch_sizes: Vec<usize> = calls
            .iter()
            .map(|c| c.url.rsplit('/').next().unwrap().split(',').count())
            .collect();
        assert_eq!(batch_sizes, vec![30, 30, 15]);
        assert_eq!(results.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn test_autocomplete_all_merges_rankings() {
        let transport = FakeTransport::new(|request| {
            let body = match request.query_param("order_by") {
                Some("area") => json!({"results": [{"id": 2}, {"id": 3}]}),
                _ => json!({"results": [{"id": 1}, {"id": 2}]}),
            };
            Ok(HttpResponse::new(200, body.to_string()))
        });
        let places = Places::new(test_session(transport.clone()).await);

        let results = places.autocomplete_all("springbok").await.unwrap();

        assert_eq!(results.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].query_param("order_by"), None);
        assert_eq!(calls[1].query_param("q"), Some("springbok"));
        assert_eq!(calls[1].query_param("per_page"), Some("20"));
    }

    #[tokio::test]
    async fn test_nearby() {
        let transport = FakeTransport::json(json!({
            "total_results": 3,
            "results": {
                "standard": [{"id": 1, "name": "Riversdale"}, {"id": 2, "name": "Western Cape"}],
                "community": [{"id": 3, "name": "Riversdale Nature Area"}],
            },
        }));
        let places = Places::new(test_session(transport.clone()).await);

        let bbox = BoundingBox {
            nelat: -34.0,
            nelng: 21.3,
            swlat: -34.2,
            swlng: 21.1,
        };
        let nearby = places.nearby(bbox, Some("Riversdale")).await.unwrap();

        assert_eq!(nearby.standard.len(), 2);
        assert_eq!(nearby.community[0].category.as_deref(), Some("community"));
        let call = &transport.calls()[0];
        assert_eq!(call.url, "https://api.inaturalist.org/v1/places/nearby");
        assert_eq!(call.query_param("nelat"), Some("-34"));
        assert_eq!(call.query_param("swlng"), Some("21.1"));
        assert_eq!(call.query_param("name"), Some("Riversdale"));
    }

    #[tokio::test]
    async fn test_nearby_dry_run() {
        let transport = FakeTransport::json(json!({}));
        let config = crate::testing::test_config().with_dry_run(true);
        let places = Places::new(crate::testing::session_with(config, transport.clone()).await);

        let bbox = BoundingBox {
            nelat: 1.0,
            nelng: 1.0,
            swlat: 0.0,
            swlng: 0.0,
        };
        let nearby = places.nearby(bbox, None).await.unwrap();

        assert!(nearby.all().next().is_none());
        assert_eq!(transport.call_count(), 0);
    }
}
