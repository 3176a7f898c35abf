//! Synchronous facade over [`InatClient`]
//!
//! Each [`BlockingClient`] owns a current-thread tokio runtime and blocks the calling thread
//! on it. Don't call it from inside an async context; use [`InatClient`] there.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::client::InatClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::Model;
use crate::paginator::Paginator;
use crate::transport::Transport;

pub struct BlockingClient {
    runtime: Arc<Runtime>,
    client: InatClient,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runtime = runtime()?;
        let client = runtime.block_on(InatClient::new(config))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            client,
        })
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let runtime = runtime()?;
        let client = runtime.block_on(InatClient::with_transport(config, transport))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            client,
        })
    }

    /// The async client, for building requests and paginators
    pub fn client(&self) -> &InatClient {
        &self.client
    }

    /// Run one future to completion
    ///
    /// ```no_run
    /// # fn example() -> inat_api::Result<()> {
    /// let client = inat_api::BlockingClient::new(inat_api::ClientConfig::default())?;
    /// let taxon = client.block_on(client.client().taxa().get(3))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Iterate a paginator's results, fetching pages as the iterator advances
    pub fn paginate<T: Model>(&self, paginator: Paginator<T>) -> BlockingPaginator<T> {
        BlockingPaginator {
            runtime: Arc::clone(&self.runtime),
            paginator,
            buffer: VecDeque::new(),
            failed: false,
        }
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient").field("client", &self.client).finish()
    }
}

fn runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// Iterator over every result of a paginated search
///
/// Yields one `Err` and then ends if a page fails to load.
pub struct BlockingPaginator<T: Model> {
    runtime: Arc<Runtime>,
    paginator: Paginator<T>,
    buffer: VecDeque<T>,
    failed: bool,
}

impl<T: Model> BlockingPaginator<T> {
    pub fn total_results(&self) -> Option<u64> {
        self.paginator.total_results()
    }
}

impl<T: Model> Iterator for BlockingPaginator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.failed {
                return None;
            }
            match self.runtime.block_on(self.paginator.next_page()) {
                Ok(Some(page)) => self.buffer.extend(page),
                Ok(None) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
