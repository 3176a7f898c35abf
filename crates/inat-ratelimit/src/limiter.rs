use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::error::{RateLimitError, Result};
use crate::store::{BucketStore, FileBucketStore, MemoryBucketStore};
use crate::types::{Acquisition, BucketState, Rate};

/// Rate limiter that waits until every configured window has a free slot
#[derive(Clone)]
pub struct RateLimiter {
    rates: Arc<Vec<Rate>>,
    store: Arc<dyn BucketStore>,
    max_delay: Option<Duration>,
}

impl RateLimiter {
    pub fn new(rates: Vec<Rate>, store: Arc<dyn BucketStore>) -> Self {
        Self {
            rates: Arc::new(rates),
            store,
            max_delay: None,
        }
    }

    /// Limiter shared between threads of this process only
    pub fn in_memory(rates: Vec<Rate>) -> Self {
        Self::new(rates, Arc::new(MemoryBucketStore::new()))
    }

    /// Limiter shared with every process using the same state file
    pub fn file_backed(rates: Vec<Rate>, path: impl Into<PathBuf>) -> Self {
        Self::new(rates, Arc::new(FileBucketStore::new(path)))
    }

    /// Fail instead of waiting when a slot is further away than `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn rates(&self) -> &[Rate] {
        &self.rates
    }

    /// Take a slot from `bucket` if one is free right now
    pub async fn try_acquire(&self, bucket: &str) -> Result<Acquisition> {
        let store = Arc::clone(&self.store);
        let rates = Arc::clone(&self.rates);
        let bucket = bucket.to_string();

        tokio::task::spawn_blocking(move || {
            let now = Utc::now().timestamp_micros();
            let mut outcome = Acquisition::Granted;
            store.transact(&mut |state: &mut BucketState| {
                outcome = state.try_take(&bucket, &rates, now);
                state.prune(&rates, now);
            })?;
            Ok(outcome)
        })
        .await
        .map_err(|e| RateLimitError::Task(e.to_string()))?
    }

    /// Wait until a slot is free in every window of `bucket`, then take it.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, bucket: &str) -> Result<Duration> {
        let started = Instant::now();

        loop {
            let wait = match self.try_acquire(bucket).await? {
                Acquisition::Granted => return Ok(started.elapsed()),
                Acquisition::Wait(wait) => wait,
            };

            if let Some(max_delay) = self.max_delay {
                let required = started.elapsed() + wait;
                if required > max_delay {
                    return Err(RateLimitError::DelayExceeded {
                        bucket: bucket.to_string(),
                        required,
                        max_delay,
                    });
                }
            }

            debug!(
                bucket,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rates", &self.rates)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}
