//! Client for the iNaturalist API
//!
//! Wraps the v0 REST API and the v1/v2 JSON APIs with typed models, pagination, access-token
//! handling, client-side rate limiting and response caching.
//!
//! # Example
//!
//! ```no_run
//! use inat_api::{ClientConfig, InatClient, Params};
//!
//! # async fn example() -> inat_api::Result<()> {
//! let client = InatClient::new(ClientConfig::default()).await?;
//!
//! // Research-grade observations of a taxon, fetched a page at a time
//! let observations = client
//!     .observations()
//!     .search(Params::new().set("taxon_id", 47651).set("quality_grade", "research"))?
//!     .limit(500)
//!     .await?;
//! for observation in &observations {
//!     println!("{} {:?}", observation.id, observation.species_guess);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requests
//!
//! Every request goes through one [`Session`]:
//!
//! 1. Parameters are validated and converted to their wire form
//! 2. In dry-run mode the request is logged and a placeholder response returned
//! 3. Cached responses are returned without a network call
//! 4. The rate limiter waits for a free slot in every window
//! 5. The request is sent, with retries for 429, 5xx and connection errors. The wait is
//!    exponential backoff, or the server's `Retry-After` when it sends one
//! 6. Successful responses are cached with the request's expiration, the response's
//!    `Cache-Control` header or the expiration for their URL
//! 7. If the request still fails, an expired cached response is returned instead when
//!    there is one

pub mod api;
mod auth;
pub mod blocking;
mod client;
mod config;
pub mod constants;
mod error;
pub mod models;
mod paginator;
mod params;
mod request;
mod session;
mod transport;

#[cfg(test)]
mod testing;

pub use auth::{load_credentials, store_credentials, CredentialStore, Credentials, MemoryCredentialStore};
pub use blocking::{BlockingClient, BlockingPaginator};
pub use client::InatClient;
pub use config::{default_data_dir, ClientConfig};
pub use error::{InatError, Result};
pub use paginator::{PageStrategy, Paginator};
pub use params::{join_ids, normalize_rank, parse_ids, rank_range, ParamValue, Params};
pub use request::{
    ApiRequest, ApiResponse, FormPart, Method, PreparedRequest, RequestBody, ResponseSource,
    METHOD_OVERRIDE_HEADER,
};
pub use session::Session;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

pub use response_cache::Expiration;
