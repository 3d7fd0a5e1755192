//! Fluent builder API for creating Boost indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use boostindex_bsv::IndexerBuilder;
//! use boostindex_core::store::InvalidationPolicy;
//! use boostindex_storage::InMemoryStorage;
//!
//! let (index_loop, sender, replays) = IndexerBuilder::new()
//!     .id("boost-mainnet")
//!     .start_height(630_000)
//!     .tracker_window(256)
//!     .invalidation(InvalidationPolicy::RemoveAll)
//!     .build_with_channel(Arc::new(InMemoryStorage::new()));
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use boostindex_core::indexer::IndexerConfig;
use boostindex_core::retry::RetryConfig;
use boostindex_core::store::{IndexStore, InvalidationPolicy};

use crate::feed::{ChainFeed, ChannelFeed, FeedSender};
use crate::index_loop::IndexLoop;

/// Fluent builder for `IndexerConfig` and the index loop around it.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing configuration (e.g. one read from a file).
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the chain slug.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Set the first height indexed when no checkpoint exists.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = height;
        self
    }

    /// Set how many recent blocks are kept for fork-point lookup.
    pub fn tracker_window(mut self, blocks: usize) -> Self {
        self.config.tracker_window = blocks;
        self
    }

    /// Set the feed queue capacity.
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.config.event_buffer = size;
        self
    }

    /// Set how many mempool transactions are indexed at once.
    pub fn mempool_concurrency(mut self, n: usize) -> Self {
        self.config.mempool_concurrency = n;
        self
    }

    pub fn invalidation(mut self, policy: InvalidationPolicy) -> Self {
        self.config.invalidation = policy;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set checkpoint save interval (every N blocks).
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Build an index loop reading from `feed`.
    pub fn build<F: ChainFeed>(self, store: Arc<dyn IndexStore>, feed: F) -> IndexLoop<F> {
        IndexLoop::new(self.config, store, feed)
    }

    /// Build an index loop over a fresh [`ChannelFeed`] sized by `event_buffer`.
    ///
    /// Returns the loop, the sender for the upstream listener, and the
    /// receiver of replay requests the listener must serve.
    pub fn build_with_channel(
        self,
        store: Arc<dyn IndexStore>,
    ) -> (IndexLoop<ChannelFeed>, FeedSender, mpsc::UnboundedReceiver<u64>) {
        let (feed, sender, replays) = ChannelFeed::new(self.config.event_buffer);
        (self.build(store, feed), sender, replays)
    }
}
