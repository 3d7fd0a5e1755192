//! boostindex-core — foundation for the reorg-safe Boost PoW indexer.
//!
//! # Architecture
//!
//! ```text
//! ChainFeed ─▶ IndexLoop (single ordered queue)
//!                  ├── ReorgCoordinator  (Synced → Diverged → Rewinding → Recovering)
//!                  │      ├── ChainCursor   (best height + hash, owned here)
//!                  │      └── BlockTracker  (recent lineage, fork-point lookup)
//!                  ├── PatternDetector   (job / proof / content / none per output/input)
//!                  └── Indexer ─▶ IndexStore (atomic TxWrite, invalidate_range)
//!                                    └── CheckpointStore (cursor persistence)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod detector;
pub mod error;
pub mod indexer;
pub mod pattern;
pub mod reorg;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod tx;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use cursor::ChainCursor;
pub use detector::{DetectedRecord, Detection, PatternDetector, Position, TxDetections};
pub use error::IndexerError;
pub use indexer::{IndexerConfig, IndexerState};
pub use reorg::{
    BlockVerdict, ReconnectAction, ReorgCause, ReorgCoordinator, RewindPlan, StaleReason, SyncState,
};
pub use retry::{RetryConfig, RetryPolicy};
pub use store::{
    IndexQuery, IndexStats, IndexStore, InvalidationPolicy, InvalidationReport, TxWrite, WriteOutcome,
};
pub use tracker::BlockTracker;
pub use tx::{ScriptBuf, Transaction};
pub use types::{
    Block, BlockRef, BlockStamp, Content, ContentRecord, ContentView, Job, JobFilter, JobRecord, Proof,
    ProofRecord, RawTransaction, RecordKey,
};
