//! Endpoint handles, one per API resource
//!
//! Each handle is a cheap clone of the shared [`Session`] plus the knowledge of one
//! resource's URLs. Searches return a [`Paginator`](crate::Paginator); lookups by ID return
//! models directly.

mod controlled_terms;
mod identifications;
mod observation_fields;
mod observations;
mod places;
mod projects;
mod search;
mod taxa;
mod users;

pub use controlled_terms::ControlledTerms;
pub use identifications::Identifications;
pub use observation_fields::ObservationFields;
pub use observations::{Histogram, Observations};
pub use places::{BoundingBox, Places};
pub use projects::Projects;
pub use search::Search;
pub use taxa::Taxa;
pub use users::Users;

use serde_json::Value;

use crate::constants::IDS_PER_REQUEST;
use crate::error::{InatError, Result};
use crate::models::Model;
use crate::params::join_ids;
use crate::request::{ApiRequest, METHOD_OVERRIDE_HEADER};
use crate::session::Session;

/// Fetch a list of records
async fn fetch_all<T: Model>(session: &Session, request: ApiRequest) -> Result<Vec<T>> {
    let response = session.execute(request).await?;
    T::from_json_list(&response.body)
}

/// Fetch a single record; an empty result set is [`InatError::NotFound`]
async fn fetch_one<T: Model>(session: &Session, request: ApiRequest) -> Result<T> {
    let url = request.url.clone();
    fetch_all(session, request)
        .await?
        .into_iter()
        .next()
        .ok_or(InatError::NotFound { url, body: None })
}

/// Fetch records by ID, [`IDS_PER_REQUEST`] IDs per request, batches in the order given
async fn fetch_by_ids<T, F>(session: &Session, ids: &[u64], request_for: F) -> Result<Vec<T>>
where
    T: Model,
    F: Fn(&[u64]) -> Result<ApiRequest>,
{
    if ids.is_empty() {
        return Err(InatError::Validation("At least one ID is required".into()));
    }
    let mut records = Vec::with_capacity(ids.len());
    for batch in ids.chunks(IDS_PER_REQUEST) {
        records.extend(fetch_all::<T>(session, request_for(batch)?).await?);
    }
    Ok(records)
}

/// `{base}/{resource}/1,2,3`
fn ids_url(base: &str, resource: &str, ids: &[u64]) -> Result<String> {
    Ok(format!("{base}/{resource}/{}", join_ids(ids)?))
}

/// A search whose field selection is sent in the body of a POST that the API treats as a GET
fn field_selection_request(url: String, fields: Value) -> ApiRequest {
    ApiRequest::post(url)
        .header(METHOD_OVERRIDE_HEADER, "GET")
        .json(serde_json::json!({ "fields": fields }))
}
