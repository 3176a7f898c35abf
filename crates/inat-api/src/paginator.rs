//! Pagination over search endpoints

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{self, Stream};
use serde_json::Value;
use tracing::{info, warn};

use crate::constants::{EXPORT_URL, LARGE_REQUEST_WARNING, PER_PAGE_RESULTS};
use crate::error::{InatError, Result};
use crate::models::Model;
use crate::params::ParamValue;
use crate::request::ApiRequest;
use crate::session::Session;

/// How successive pages are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// `page=1, 2, 3...`
    PageNumber,
    /// `id_above=<last id>` with results sorted by ascending ID, for endpoints that refuse
    /// deep page numbers
    IdRange,
}

/// Fetches one page of results at a time from a search request
///
/// Pages are fetched strictly one after another through the shared session, so they draw
/// on the same rate budget and cache as every other request.
pub struct Paginator<T: Model> {
    session: Arc<Session>,
    request: ApiRequest,
    strategy: PageStrategy,
    per_page: u64,
    limit: Option<u64>,
    page: u64,
    last_id: Option<u64>,
    fetched: u64,
    total_results: Option<u64>,
    exhausted: bool,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Paginator<T> {
    /// Paginate by page number, starting from the request's `page` and `per_page` if set
    pub fn new(session: Arc<Session>, mut request: ApiRequest) -> Self {
        let per_page = take_int(&mut request, "per_page").unwrap_or(PER_PAGE_RESULTS);
        let page = take_int(&mut request, "page").unwrap_or(1).max(1);
        Self {
            session,
            request,
            strategy: PageStrategy::PageNumber,
            per_page,
            limit: None,
            page,
            last_id: None,
            fetched: 0,
            total_results: None,
            exhausted: false,
            _model: PhantomData,
        }
    }

    /// Paginate by ascending ID instead of page number
    pub fn id_range(mut self) -> Self {
        self.strategy = PageStrategy::IdRange;
        self.last_id = take_int(&mut self.request, "id_above");
        self.request.params.remove("page");
        self
    }

    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Stop after `limit` results in total
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn strategy(&self) -> PageStrategy {
        self.strategy
    }

    /// Total reported by the server, once the first page has been fetched
    pub fn total_results(&self) -> Option<u64> {
        self.total_results
    }

    /// Results returned so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page; `None` once there are no more results
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.exhausted {
            return Ok(None);
        }

        let remaining = self.limit.map(|limit| limit.saturating_sub(self.fetched));
        let per_page = match remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(None);
            }
            Some(remaining) if remaining < self.per_page && self.can_shrink_page() => remaining,
            _ => self.per_page,
        };

        let response = self.session.execute(self.page_request(per_page)).await?;
        if self.total_results.is_none() {
            self.total_results = response.total_results();
            self.log_estimate();
        }

        let mut results = T::from_json_list(&response.body)?;
        let count = results.len() as u64;
        if let Some(remaining) = remaining {
            results.truncate(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        self.last_id = last_id(&response.body).or(self.last_id);
        self.fetched += results.len() as u64;
        self.page += 1;

        self.exhausted = count == 0
            || count < per_page
            || self.total_results.is_some_and(|total| self.fetched >= total)
            || self.limit.is_some_and(|limit| self.fetched >= limit);

        if results.is_empty() {
            return Ok(None);
        }
        Ok(Some(results))
    }

    /// A smaller page keeps later page offsets right only for ID ranges or the first page
    fn can_shrink_page(&self) -> bool {
        self.strategy == PageStrategy::IdRange || self.page == 1
    }

    /// Fetch every remaining result
    pub async fn all(mut self) -> Result<Vec<T>> {
        let mut results = Vec::new();
        while let Some(page) = self.next_page().await? {
            results.extend(page);
        }
        Ok(results)
    }

    /// Fetch at most `n` results
    pub async fn limit(self, n: u64) -> Result<Vec<T>> {
        self.with_limit(n).all().await
    }

    /// Fetch only the first result
    pub async fn one(self) -> Result<Option<T>> {
        let results = self.per_page(1).limit(1).await?;
        Ok(results.into_iter().next())
    }

    /// Total number of results, without fetching any of them
    pub async fn count(&self) -> Result<u64> {
        if let Some(total) = self.total_results {
            return Ok(total);
        }
        let mut request = self.request.clone();
        request.params.insert("per_page", 0);
        let response = self.session.execute(request).await?;
        Ok(response.total_results().unwrap_or(0))
    }

    /// Stream results one at a time, fetching pages as they are needed
    ///
    /// Dropping the stream stops further fetches.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::try_unfold((self, VecDeque::new()), |(mut paginator, mut buffer)| async move {
            loop {
                if let Some(item) = buffer.pop_front() {
                    return Ok::<_, InatError>(Some((item, (paginator, buffer))));
                }
                match paginator.next_page().await? {
                    Some(page) => buffer.extend(page),
                    None => return Ok(None),
                }
            }
        })
    }

    fn page_request(&self, per_page: u64) -> ApiRequest {
        let mut request = self.request.clone();
        request.params.insert("per_page", per_page);
        match self.strategy {
            PageStrategy::PageNumber => request.params.insert("page", self.page),
            PageStrategy::IdRange => {
                request.params.insert("order_by", "id");
                request.params.insert("order", "asc");
                if let Some(last_id) = self.last_id {
                    request.params.insert("id_above", last_id);
                }
            }
        }
        request
    }

    fn log_estimate(&self) {
        let Some(total) = self.total_results else {
            return;
        };
        let expected = self.limit.map_or(total, |limit| limit.min(total));
        let requests = expected.div_ceil(self.per_page.max(1));
        info!(
            url = %self.request.url,
            total_results = total,
            expected,
            requests,
            "Fetching results"
        );
        if expected > LARGE_REQUEST_WARNING {
            warn!(
                expected,
                requests,
                "This query will fetch a large number of records; consider a data export instead: {EXPORT_URL}"
            );
        }
    }
}

impl<T: Model> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("model", &T::NAME)
            .field("url", &self.request.url)
            .field("strategy", &self.strategy)
            .field("per_page", &self.per_page)
            .field("limit", &self.limit)
            .field("fetched", &self.fetched)
            .field("total_results", &self.total_results)
            .finish()
    }
}

fn take_int(request: &mut ApiRequest, key: &str) -> Option<u64> {
    match request.params.remove(key)? {
        ParamValue::Int(n) => u64::try_from(n).ok(),
        ParamValue::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ID of the last raw result, for the next `id_above`
fn last_id(body: &Value) -> Option<u64> {
    let results = body.get("results").unwrap_or(body).as_array()?;
    let id = results.last()?.get("id")?;
    id.as_u64().or_else(|| id.as_str()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Taxon;
    use crate::testing::{test_session, FakeTransport};
    use crate::transport::{HttpRequest, HttpResponse};
    use futures::StreamExt;
    use serde_json::json;

    const TOTAL: u64 = 5;

    /// Serves taxa 1..=TOTAL by page number or by `id_above`
    fn taxa_server() -> std::sync::Arc<FakeTransport> {
        FakeTransport::new(|request: &HttpRequest| {
            let per_page: u64 = request.query_param("per_page").unwrap().parse().unwrap();
            let ids: Vec<u64> = match request.query_param("id_above") {
                Some(above) => {
                    let above: u64 = above.parse().unwrap();
                    (above + 1..=TOTAL).take(per_page as usize).collect()
                }
                None if request.query_param("order_by") == Some("id") => {
                    (1..=TOTAL).take(per_page as usize).collect()
                }
                None => {
                    let page: u64 = request.query_param("page").unwrap_or("1").parse().unwrap();
                    ((page - 1) * per_page + 1..=TOTAL).take(per_page as usize).collect()
                }
            };
            let results: Vec<Value> = ids.iter().map(|id| json!({"id": id, "name": format!("taxon {id}")})).collect();
            let body = json!({"total_results": TOTAL, "page": 1, "per_page": per_page, "results": results});
            Ok(HttpResponse::new(200, body.to_string()))
        })
    }

    fn request() -> ApiRequest {
        ApiRequest::get("https://api.inaturalist.org/v1/taxa").param("q", "bee")
    }

    fn ids(taxa: &[Taxon]) -> Vec<u64> {
        taxa.iter().map(|t| t.id).collect()
    }

    #[tokio::test]
    async fn test_all_pages() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let taxa = Paginator::<Taxon>::new(session, request()).per_page(2).all().await.unwrap();

        assert_eq!(ids(&taxa), vec![1, 2, 3, 4, 5]);
        assert_eq!(transport.call_count(), 3);
        let calls = transport.calls();
        let pages: Vec<Option<&str>> = calls.iter().map(|c| c.query_param("page")).collect();
        assert_eq!(pages, vec![Some("1"), Some("2"), Some("3")]);
    }

    #[tokio::test]
    async fn test_stops_when_total_reached() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let taxa = Paginator::<Taxon>::new(session, request()).per_page(5).all().await.unwrap();

        assert_eq!(taxa.len(), 5);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_limit_truncates_last_page() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let taxa = Paginator::<Taxon>::new(session, request()).per_page(2).limit(3).await.unwrap();

        assert_eq!(ids(&taxa), vec![1, 2, 3]);
        let calls = transport.calls();
        let sizes: Vec<Option<&str>> = calls.iter().map(|c| c.query_param("per_page")).collect();
        assert_eq!(sizes, vec![Some("2"), Some("2")]);
    }

    #[tokio::test]
    async fn test_limit_shrinks_page_size() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let first_page = Paginator::<Taxon>::new(session.clone(), request()).per_page(4).limit(3).await.unwrap();
        let id_range = Paginator::<Taxon>::new(session, request())
            .id_range()
            .per_page(2)
            .limit(3)
            .await
            .unwrap();

        assert_eq!(ids(&first_page), vec![1, 2, 3]);
        assert_eq!(ids(&id_range), vec![1, 2, 3]);
        let calls = transport.calls();
        let sizes: Vec<Option<&str>> = calls.iter().map(|c| c.query_param("per_page")).collect();
        assert_eq!(sizes, vec![Some("3"), Some("2"), Some("1")]);
    }

    #[tokio::test]
    async fn test_one() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let taxon = Paginator::<Taxon>::new(session, request()).one().await.unwrap();

        assert_eq!(taxon.map(|t| t.id), Some(1));
        assert_eq!(transport.calls()[0].query_param("per_page"), Some("1"));
    }

    #[tokio::test]
    async fn test_count() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let paginator = Paginator::<Taxon>::new(session, request());
        assert_eq!(paginator.count().await.unwrap(), TOTAL);
        assert_eq!(transport.calls()[0].query_param("per_page"), Some("0"));
    }

    #[tokio::test]
    async fn test_stream() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let stream = Paginator::<Taxon>::new(session, request()).per_page(2).into_stream();
        let taxa: Vec<Taxon> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(ids(&taxa), vec![1, 2, 3, 4, 5]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_fetching() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let stream = Paginator::<Taxon>::new(session, request()).per_page(2).into_stream();
        let first: Vec<Taxon> = stream.take(1).map(|r| r.unwrap()).collect().await;

        assert_eq!(ids(&first), vec![1]);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_id_range() {
        let transport = taxa_server();
        let session = test_session(transport.clone()).await;

        let taxa = Paginator::<Taxon>::new(session, request())
            .id_range()
            .per_page(2)
            .all()
            .await
            .unwrap();

        assert_eq!(ids(&taxa), vec![1, 2, 3, 4, 5]);
        let calls = transport.calls();
        let above: Vec<Option<&str>> = calls.iter().map(|c| c.query_param("id_above")).collect();
        assert_eq!(above, vec![None, Some("2"), Some("4")]);
        assert!(calls.iter().all(|c| c.query_param("order") == Some("asc")));
        assert!(calls.iter().all(|c| c.query_param("page").is_none()));
    }

    #[tokio::test]
    async fn test_empty_results() {
        let transport = FakeTransport::json(json!({"total_results": 0, "results": []}));
        let session = test_session(transport.clone()).await;

        let mut paginator = Paginator::<Taxon>::new(session, request());
        assert!(paginator.next_page().await.unwrap().is_none());
        assert!(paginator.is_exhausted());
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_v0_array_with_total_header() {
        let transport = FakeTransport::new(|request: &HttpRequest| {
            let page = request.query_param("page").unwrap_or("1");
            let body = if page == "1" { json!([{"id": 1}, {"id": 2}]) } else { json!([{"id": 3}]) };
            Ok(HttpResponse::new(200, body.to_string()).with_header("X-Total-Entries", "3"))
        });
        let session = test_session(transport.clone()).await;

        let mut paginator = Paginator::<Taxon>::new(session, request()).per_page(2);
        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(paginator.total_results(), Some(3));
        let second = paginator.next_page().await.unwrap().unwrap();

        assert_eq!(ids(&first), vec![1, 2]);
        assert_eq!(ids(&second), vec![3]);
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_last_id() {
        assert_eq!(last_id(&json!({"results": [{"id": 1}, {"id": "9"}]})), Some(9));
        assert_eq!(last_id(&json!([{"id": 4}])), Some(4));
        assert_eq!(last_id(&json!({"results": []})), None);
    }
}
