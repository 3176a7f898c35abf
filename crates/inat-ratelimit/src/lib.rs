//! Sliding-window rate limiting for outgoing API requests
//!
//! A [`RateLimiter`] enforces any number of request rates at once (for example 1 per
//! second, 60 per minute and 10,000 per day). Each rate keeps a log of the requests still
//! inside its window; a slot frees up the moment the request that used it ages out, so
//! capacity returns continuously rather than at fixed window boundaries.
//!
//! Bucket state lives behind a [`BucketStore`]. [`MemoryBucketStore`] is shared between
//! threads of one process, while [`FileBucketStore`] persists state to disk under an
//! advisory file lock so that several processes using the same credentials share one budget.
//!
//! # Example
//!
//! ```no_run
//! use inat_ratelimit::{Rate, RateLimiter};
//!
//! # async fn example() -> inat_ratelimit::Result<()> {
//! let limiter = RateLimiter::in_memory(vec![Rate::per_second(1.0), Rate::per_minute(60.0)]);
//! limiter.acquire("api.inaturalist.org").await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod limiter;
mod store;
mod types;

pub use error::{RateLimitError, Result};
pub use limiter::RateLimiter;
pub use store::{BucketStore, FileBucketStore, MemoryBucketStore};
pub use types::{Acquisition, BucketState, Rate};
