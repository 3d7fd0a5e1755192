//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::store::InvalidationPolicy;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub id: String,
    /// Chain to index (e.g. `"bsv"`).
    pub chain: String,
    /// First block to index when no checkpoint exists. Must be at least 1.
    pub start_height: u64,
    /// Number of recent blocks kept for fork-point lookup.
    pub tracker_window: usize,
    /// Capacity of the feed event queue.
    pub event_buffer: usize,
    /// Maximum mempool transactions indexed at once.
    pub mempool_concurrency: usize,
    /// What to do with records of orphaned blocks.
    pub invalidation: InvalidationPolicy,
    /// Backoff for failed storage writes.
    pub retry: RetryConfig,
    /// Save the cursor every N committed blocks.
    pub checkpoint_interval: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "boostpow".into(),
            chain: "bsv".into(),
            start_height: 1,
            tracker_window: 128,
            event_buffer: 1024,
            mempool_concurrency: 16,
            invalidation: InvalidationPolicy::default(),
            retry: RetryConfig::default(),
            checkpoint_interval: 1,
        }
    }
}

/// Runtime state of the index loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Following the feed.
    Live,
    /// Rewinding or replaying after a reorg.
    ReorgRecovery,
    /// The feed is disconnected; waiting for it to come back.
    Disconnected,
    /// Terminated.
    Stopped,
    /// A storage write exhausted its retries.
    Stalled,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Live => write!(f, "live"),
            Self::ReorgRecovery => write!(f, "reorg-recovery"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Stopped => write!(f, "stopped"),
            Self::Stalled => write!(f, "stalled"),
        }
    }
}
