//! The index loop: one ordered event queue driving the reorg coordinator.
//!
//! # Startup
//! Load the persisted cursor (or start unanchored at `start_height`), purge
//! records a crash may have left above it, and ask the feed to replay from
//! the next height.
//!
//! # Events
//! - `NewBlock`: the coordinator decides. `Apply` indexes the block, commits
//!   the cursor and persists it; `Gap` requests a replay; `Stale` is dropped
//!   (with a warning when it is ahead of an outstanding replay);
//!   `Diverged` rewinds first.
//! - `Reorg`: rewind to the common ancestor, then replay toward the new tip.
//!   A reorg during recovery abandons the recovery.
//! - `MempoolTx`: indexed on a bounded pool of tasks, concurrently with block
//!   work (mempool writes touch only unconfirmed records).
//! - `Disconnected` / `Reconnected`: a reconnect compares the feed tip with
//!   the cursor and catches up or rewinds.
//!
//! Rewinds persist the rewound cursor before invalidating, so a crash in
//! between is repaired by the startup purge. A write that exhausts its retries
//! stops the loop with [`IndexerError::IngestionStalled`]; no height is skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinError, JoinSet};

use boostindex_core::checkpoint::CheckpointManager;
use boostindex_core::cursor::ChainCursor;
use boostindex_core::error::IndexerError;
use boostindex_core::indexer::{IndexerConfig, IndexerState};
use boostindex_core::reorg::{
    BlockVerdict, ReconnectAction, ReorgCause, ReorgCoordinator, RewindPlan, StaleReason, SyncState,
};
use boostindex_core::retry::RetryPolicy;
use boostindex_core::store::{IndexStore, WriteOutcome};
use boostindex_core::types::{Block, BlockRef, RawTransaction};

use crate::feed::{ChainEvent, ChainFeed};
use crate::indexer::{BlockReport, Indexer};

/// Status published by the index loop for observability.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLoopEvent {
    BlockIndexed(BlockReport),
    MempoolIndexed { txid: String, outcome: WriteOutcome },
    ReorgStarted {
        ancestor: u64,
        previous_best: u64,
        cause: ReorgCause,
        epoch: u64,
    },
    RecoveryComplete { height: u64, hash: String, epoch: u64 },
    StaleBlockIgnored {
        height: u64,
        hash: String,
        reason: StaleReason,
    },
    ReplayRequested { from: u64 },
    Stalled { height: u64, reason: String },
}

/// Counters since the loop was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub blocks_indexed: u64,
    pub stale_blocks: u64,
    pub mempool_txs: u64,
    /// Mempool transactions that carried at least one Boost record.
    pub mempool_matched: u64,
    pub reorgs: u64,
    pub replays_requested: u64,
    /// Rows removed or unconfirmed by rewinds and startup purges.
    pub records_invalidated: u64,
    pub double_spends_dropped: u64,
}

type MempoolResult = Result<(String, WriteOutcome), IndexerError>;

/// Drives a [`ChainFeed`] into an [`IndexStore`].
pub struct IndexLoop<F: ChainFeed> {
    config: IndexerConfig,
    indexer: Indexer,
    feed: F,
    coordinator: ReorgCoordinator,
    checkpoints: CheckpointManager<dyn IndexStore>,
    state: IndexerState,
    mempool: JoinSet<MempoolResult>,
    mempool_slots: Arc<Semaphore>,
    events: broadcast::Sender<IndexLoopEvent>,
    stats: LoopStats,
}

impl<F: ChainFeed> IndexLoop<F> {
    pub fn new(config: IndexerConfig, store: Arc<dyn IndexStore>, feed: F) -> Self {
        let indexer = Indexer::new(
            store.clone(),
            RetryPolicy::new(config.retry.clone()),
            config.invalidation,
        );
        let checkpoints = CheckpointManager::new(store, &config.chain, &config.id, config.checkpoint_interval);
        let coordinator = ReorgCoordinator::new(
            ChainCursor::unanchored(config.start_height.max(1)),
            config.tracker_window,
        );
        let (events, _) = broadcast::channel(config.event_buffer.max(16));
        Self {
            indexer,
            feed,
            coordinator,
            checkpoints,
            state: IndexerState::Idle,
            mempool: JoinSet::new(),
            mempool_slots: Arc::new(Semaphore::new(config.mempool_concurrency.max(1))),
            events,
            stats: LoopStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn sync_state(&self) -> SyncState {
        self.coordinator.state()
    }

    /// The committed chain position.
    pub fn cursor(&self) -> &ChainCursor {
        self.coordinator.cursor()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Receive [`IndexLoopEvent`]s. Slow receivers miss events rather than
    /// slowing the loop.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexLoopEvent> {
        self.events.subscribe()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Resume from the persisted cursor and request a replay from the next height.
    pub async fn resume(&mut self) -> Result<ChainCursor, IndexerError> {
        let cursor = match self.checkpoints.load().await? {
            Some(cursor) => {
                tracing::info!(
                    height = cursor.best_height,
                    hash = %cursor.best_hash,
                    "resuming from checkpoint"
                );
                cursor
            }
            None => {
                let start = self.config.start_height.max(1);
                tracing::info!(start, "no checkpoint, starting fresh");
                ChainCursor::unanchored(start)
            }
        };

        let purged = self.indexer.purge_above(cursor.best_height).await?;
        self.stats.records_invalidated += purged.touched() as u64;

        self.coordinator = ReorgCoordinator::new(cursor.clone(), self.config.tracker_window);
        self.state = IndexerState::Live;
        self.request_replay(cursor.next_height()).await?;
        Ok(cursor)
    }

    /// Resume, then process events until the feed closes or a write stalls.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let result = match self.resume().await {
            Ok(_) => self.event_loop().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    async fn event_loop(&mut self) -> Result<(), IndexerError> {
        loop {
            tokio::select! {
                Some(joined) = self.mempool.join_next(), if !self.mempool.is_empty() => {
                    self.on_mempool_done(joined)?;
                }
                event = self.feed.next_event() => {
                    let Some(event) = event else { break };
                    self.handle(event).await?;
                }
            }
        }

        self.drain_mempool().await?;
        self.state = IndexerState::Stopped;
        tracing::info!(
            height = self.cursor().best_height,
            blocks = self.stats.blocks_indexed,
            reorgs = self.stats.reorgs,
            "feed closed, index loop stopped"
        );
        Ok(())
    }

    /// Wait for every in-flight mempool task.
    pub async fn drain_mempool(&mut self) -> Result<(), IndexerError> {
        while let Some(joined) = self.mempool.join_next().await {
            self.on_mempool_done(joined)?;
        }
        Ok(())
    }

    fn fail(&mut self, error: &IndexerError) {
        match error {
            IndexerError::IngestionStalled { height, reason, .. } => {
                self.state = IndexerState::Stalled;
                tracing::error!(height, reason = %reason, "ingestion stalled");
                self.emit(IndexLoopEvent::Stalled {
                    height: *height,
                    reason: reason.clone(),
                });
            }
            other => {
                self.state = IndexerState::Stopped;
                tracing::error!(error = %other, "index loop stopped");
            }
        }
    }

    // ─── Event handling ──────────────────────────────────────────────────────

    /// Process one feed event to completion (mempool work is only spawned).
    pub async fn handle(&mut self, event: ChainEvent) -> Result<(), IndexerError> {
        match event {
            ChainEvent::NewBlock(block) => self.on_block(block).await?,
            ChainEvent::MempoolTx(tx) => self.on_mempool(tx).await?,
            ChainEvent::Reorg {
                common_ancestor_height,
                new_tip_hash,
            } => {
                let plan = self
                    .coordinator
                    .on_reorg(common_ancestor_height, new_tip_hash, ReorgCause::Notified);
                self.rewind(plan).await?;
            }
            ChainEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, height = self.cursor().best_height, "feed disconnected");
                self.state = IndexerState::Disconnected;
                return Ok(());
            }
            ChainEvent::Reconnected { tip } => self.on_reconnect(tip).await?,
        }
        self.refresh_state();
        Ok(())
    }

    async fn on_block(&mut self, block: Block) -> Result<(), IndexerError> {
        match self.coordinator.check_block(&block.header) {
            BlockVerdict::Apply => self.commit(&block).await,
            BlockVerdict::Stale(reason) => {
                self.stats.stale_blocks += 1;
                match reason {
                    // Dropped ahead of the cursor; the feed must resend it.
                    StaleReason::AwaitingReplay { from } => tracing::warn!(
                        height = block.height(),
                        hash = %block.header.hash,
                        replay_from = from,
                        gap = block.height() - from,
                        "dropping block ahead of outstanding replay"
                    ),
                    _ => tracing::debug!(
                        height = block.height(),
                        hash = %block.header.hash,
                        reason = %reason,
                        "ignoring stale block"
                    ),
                }
                self.emit(IndexLoopEvent::StaleBlockIgnored {
                    height: block.height(),
                    hash: block.header.hash.clone(),
                    reason,
                });
                Ok(())
            }
            BlockVerdict::Gap { replay_from } => {
                tracing::info!(height = block.height(), replay_from, "block ahead of cursor");
                self.request_replay(replay_from).await
            }
            BlockVerdict::Diverged(plan) => {
                self.rewind(plan).await?;
                // The block that revealed the fork may extend the rewound cursor.
                if self.coordinator.cursor().accepts(&block.header) {
                    self.commit(&block).await?;
                }
                Ok(())
            }
        }
    }

    async fn commit(&mut self, block: &Block) -> Result<(), IndexerError> {
        let cursor = self.coordinator.cursor().clone();
        let (next, report) = self.indexer.index_block(block, &cursor).await?;
        let recovered = self.coordinator.commit_block(&block.header, next.clone());

        if self.checkpoints.tick() {
            self.save_cursor(&next).await?;
        }

        self.stats.blocks_indexed += 1;
        self.stats.double_spends_dropped += report.outcome.double_spends_dropped as u64;
        self.emit(IndexLoopEvent::BlockIndexed(report));

        if recovered {
            self.emit(IndexLoopEvent::RecoveryComplete {
                height: next.best_height,
                hash: next.best_hash.clone(),
                epoch: self.coordinator.epoch(),
            });
        }
        Ok(())
    }

    async fn on_mempool(&mut self, tx: RawTransaction) -> Result<(), IndexerError> {
        let permit = self
            .mempool_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| IndexerError::Aborted {
                reason: "mempool pool closed".into(),
            })?;
        let indexer = self.indexer.clone();
        self.stats.mempool_txs += 1;
        self.mempool.spawn(async move {
            let _permit = permit;
            let outcome = indexer.index_transaction(&tx, None).await?;
            Ok((tx.txid, outcome))
        });
        Ok(())
    }

    fn on_mempool_done(&mut self, joined: Result<MempoolResult, JoinError>) -> Result<(), IndexerError> {
        match joined {
            Ok(Ok((txid, outcome))) => {
                if outcome != WriteOutcome::default() {
                    self.stats.mempool_matched += 1;
                    tracing::debug!(
                        txid = %txid,
                        jobs = outcome.jobs_inserted,
                        proofs = outcome.proofs_inserted,
                        "mempool transaction indexed"
                    );
                    self.emit(IndexLoopEvent::MempoolIndexed { txid, outcome });
                }
                Ok(())
            }
            // A stalled mempool write has no block height.
            Ok(Err(e)) => Err(e),
            Err(e) => Err(IndexerError::Aborted {
                reason: format!("mempool task failed: {e}"),
            }),
        }
    }

    async fn on_reconnect(&mut self, tip: BlockRef) -> Result<(), IndexerError> {
        tracing::info!(tip = tip.height, hash = %tip.hash, "feed reconnected");
        match self.coordinator.on_reconnect(&tip) {
            ReconnectAction::InSync => Ok(()),
            ReconnectAction::CatchUp { replay_from } => self.request_replay(replay_from).await,
            ReconnectAction::Diverged(plan) => self.rewind(plan).await,
        }
    }

    // ─── Rewind & replay ─────────────────────────────────────────────────────

    async fn rewind(&mut self, plan: RewindPlan) -> Result<(), IndexerError> {
        self.state = IndexerState::ReorgRecovery;
        self.stats.reorgs += 1;
        self.emit(IndexLoopEvent::ReorgStarted {
            ancestor: plan.ancestor,
            previous_best: plan.previous_best,
            cause: plan.cause,
            epoch: plan.epoch,
        });

        let cursor = self.coordinator.begin_rewind(&plan);
        self.save_cursor(&cursor).await?;
        let report = self.indexer.rewind(&plan).await?;
        self.stats.records_invalidated += report.touched() as u64;

        match self.coordinator.finish_rewind(&plan, cursor) {
            SyncState::Recovering => self.request_replay(plan.replay_from()).await?,
            SyncState::Synced => {
                let cursor = self.coordinator.cursor();
                self.emit(IndexLoopEvent::RecoveryComplete {
                    height: cursor.best_height,
                    hash: cursor.best_hash.clone(),
                    epoch: plan.epoch,
                });
            }
            SyncState::Diverged | SyncState::Rewinding => {}
        }
        Ok(())
    }

    async fn request_replay(&mut self, from: u64) -> Result<(), IndexerError> {
        self.coordinator.note_replay_requested(from);
        self.feed.replay_from(from).await?;
        self.stats.replays_requested += 1;
        tracing::info!(from, "replay requested");
        self.emit(IndexLoopEvent::ReplayRequested { from });
        Ok(())
    }

    async fn save_cursor(&self, cursor: &ChainCursor) -> Result<(), IndexerError> {
        let checkpoints = &self.checkpoints;
        self.indexer
            .retry_policy()
            .run("checkpoint", cursor.best_height, move || async move {
                checkpoints.force_save(cursor).await
            })
            .await
    }

    fn refresh_state(&mut self) {
        self.state = match self.coordinator.state() {
            SyncState::Synced => IndexerState::Live,
            _ => IndexerState::ReorgRecovery,
        };
    }

    fn emit(&self, event: IndexLoopEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChannelFeed;
    use boostindex_core::checkpoint::CheckpointStore;
    use boostindex_core::store::IndexQuery;
    use boostindex_storage::InMemoryStorage;

    fn empty_block(height: u64, hash: &str, parent: &str) -> Block {
        Block {
            header: BlockRef::new(height, hash, parent),
            timestamp: 1_700_000_000,
            transactions: vec![],
        }
    }

    fn config(start: u64) -> IndexerConfig {
        IndexerConfig {
            start_height: start,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fresh_start_requests_replay_from_start_height() {
        let (feed, _sender, mut replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(500), Arc::new(InMemoryStorage::new()), feed);
        let cursor = lp.resume().await.unwrap();
        assert!(!cursor.is_anchored());
        assert_eq!(replays.recv().await, Some(500));
        assert_eq!(lp.state(), IndexerState::Live);
    }

    #[tokio::test]
    async fn start_height_zero_is_clamped() {
        let (feed, _sender, mut replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(0), Arc::new(InMemoryStorage::new()), feed);
        lp.resume().await.unwrap();
        assert_eq!(replays.recv().await, Some(1));
    }

    #[tokio::test]
    async fn blocks_advance_and_persist_cursor() {
        let store = Arc::new(InMemoryStorage::new());
        let (feed, _sender, _replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(10), store.clone(), feed);
        lp.resume().await.unwrap();
        let mut events = lp.subscribe();

        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        lp.handle(ChainEvent::NewBlock(empty_block(11, "h11", "h10"))).await.unwrap();
        assert_eq!(lp.cursor(), &ChainCursor::new(11, "h11"));
        assert_eq!(lp.stats().blocks_indexed, 2);
        assert!(matches!(events.recv().await.unwrap(), IndexLoopEvent::BlockIndexed(r) if r.height == 10));

        let cp = store.load("bsv", "boostpow").await.unwrap().unwrap();
        assert_eq!(cp.cursor(), ChainCursor::new(11, "h11"));
        assert_eq!(store.stats().await.unwrap().jobs, 0);
    }

    #[tokio::test]
    async fn duplicate_block_is_stale() {
        let (feed, _sender, _replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(10), Arc::new(InMemoryStorage::new()), feed);
        lp.resume().await.unwrap();
        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        assert_eq!(lp.stats().stale_blocks, 1);
        assert_eq!(lp.stats().blocks_indexed, 1);
    }

    #[tokio::test]
    async fn gap_requests_replay() {
        let (feed, _sender, mut replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(10), Arc::new(InMemoryStorage::new()), feed);
        lp.resume().await.unwrap();
        assert_eq!(replays.recv().await, Some(10));

        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        lp.handle(ChainEvent::NewBlock(empty_block(13, "h13", "h12"))).await.unwrap();
        assert_eq!(replays.recv().await, Some(11));
        assert_eq!(lp.cursor().best_height, 10);
    }

    #[tokio::test]
    async fn block_ahead_of_outstanding_replay_is_reported() {
        let (feed, _sender, mut replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(10), Arc::new(InMemoryStorage::new()), feed);
        lp.resume().await.unwrap();
        assert_eq!(replays.recv().await, Some(10));
        let mut events = lp.subscribe();

        // Replay from 10 is outstanding; 12 cannot be indexed yet.
        lp.handle(ChainEvent::NewBlock(empty_block(12, "h12", "h11"))).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            IndexLoopEvent::StaleBlockIgnored {
                height: 12,
                hash: "h12".into(),
                reason: StaleReason::AwaitingReplay { from: 10 },
            }
        );
        assert_eq!(lp.stats().stale_blocks, 1);
        assert_eq!(lp.stats().replays_requested, 1);

        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), IndexLoopEvent::BlockIndexed(_)));
        assert!(matches!(
            events.recv().await.unwrap(),
            IndexLoopEvent::StaleBlockIgnored {
                reason: StaleReason::AlreadyIndexed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn disconnect_then_catch_up() {
        let (feed, _sender, mut replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(10), Arc::new(InMemoryStorage::new()), feed);
        lp.resume().await.unwrap();
        replays.recv().await;
        lp.handle(ChainEvent::NewBlock(empty_block(10, "h10", "h9"))).await.unwrap();

        lp.handle(ChainEvent::Disconnected { reason: "eof".into() }).await.unwrap();
        assert_eq!(lp.state(), IndexerState::Disconnected);

        lp.handle(ChainEvent::Reconnected {
            tip: BlockRef::new(14, "h14", "h13"),
        })
        .await
        .unwrap();
        assert_eq!(lp.state(), IndexerState::Live);
        assert_eq!(replays.recv().await, Some(11));
    }

    #[tokio::test]
    async fn run_stops_when_feed_closes() {
        let (feed, sender, _replays) = ChannelFeed::new(8);
        let mut lp = IndexLoop::new(config(1), Arc::new(InMemoryStorage::new()), feed);
        sender.new_block(empty_block(1, "h1", "h0")).await.unwrap();
        sender.new_block(empty_block(2, "h2", "h1")).await.unwrap();
        drop(sender);

        lp.run().await.unwrap();
        assert_eq!(lp.state(), IndexerState::Stopped);
        assert_eq!(lp.cursor(), &ChainCursor::new(2, "h2"));
    }
}
