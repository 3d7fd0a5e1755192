//! Reorg coordination.
//!
//! The coordinator owns the chain cursor and the block tracker and drives a
//! small state machine:
//!
//! ```text
//!            reorg / parent mismatch / divergent reconnect
//!   Synced ───────────────────────────────────────────────▶ Diverged
//!     ▲                                                        │ begin_rewind
//!     │ target block committed                                 ▼
//!   Recovering ◀──────────────────── finish_rewind ──────── Rewinding
//! ```
//!
//! Every reorg bumps the epoch. A reorg that arrives while recovering simply
//! starts a new plan from the cursor as it stands; nothing about the abandoned
//! recovery is carried over.

use serde::{Deserialize, Serialize};

use crate::cursor::ChainCursor;
use crate::tracker::BlockTracker;
use crate::types::BlockRef;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// The cursor follows the feed's tip lineage.
    Synced,
    /// A fork was reported or detected; a rewind plan exists but has not started.
    Diverged,
    /// Records in the invalidation range are being removed.
    Rewinding,
    /// Replaying blocks from the common ancestor toward the new tip.
    Recovering,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Diverged => write!(f, "diverged"),
            Self::Rewinding => write!(f, "rewinding"),
            Self::Recovering => write!(f, "recovering"),
        }
    }
}

/// What revealed the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorgCause {
    /// The feed sent a reorg notification.
    Notified,
    /// A block's parent hash did not match the indexed lineage.
    ParentMismatch,
    /// The feed reconnected reporting a tip that differs from the cursor.
    Reconnect,
}

impl std::fmt::Display for ReorgCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notified => write!(f, "notified"),
            Self::ParentMismatch => write!(f, "parent mismatch"),
            Self::Reconnect => write!(f, "reconnect"),
        }
    }
}

/// How to get from the current cursor back onto the feed's lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindPlan {
    /// Height of the last block both lineages share.
    pub ancestor: u64,
    /// Best height when the plan was made; `(ancestor, previous_best]` is invalidated.
    pub previous_best: u64,
    /// Hash of the new tip; recovery completes once it is committed.
    pub target_hash: String,
    pub cause: ReorgCause,
    pub epoch: u64,
}

impl RewindPlan {
    /// First height to invalidate and to replay.
    pub fn replay_from(&self) -> u64 {
        self.ancestor + 1
    }

    /// Inclusive invalidation range, or `None` if nothing above the ancestor was indexed.
    pub fn invalidation_range(&self) -> Option<(u64, u64)> {
        (self.previous_best > self.ancestor).then(|| (self.ancestor + 1, self.previous_best))
    }

    /// Number of blocks rolled back.
    pub fn depth(&self) -> u64 {
        self.previous_best.saturating_sub(self.ancestor)
    }
}

/// What to do with an arriving block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockVerdict {
    /// The block extends the cursor: index it.
    Apply,
    /// Nothing to index from this block: ignore it.
    Stale(StaleReason),
    /// The block is ahead of the cursor: ask the feed to replay from here.
    Gap { replay_from: u64 },
    /// The block forks the indexed lineage: rewind first.
    Diverged(RewindPlan),
}

/// Why a block was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleReason {
    /// The same block is already indexed.
    AlreadyIndexed,
    /// Below the tracked window; its lineage cannot be checked.
    BelowWindow,
    /// Ahead of the cursor while a replay from `from` is outstanding.
    AwaitingReplay { from: u64 },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyIndexed => write!(f, "already indexed"),
            Self::BelowWindow => write!(f, "below tracked window"),
            Self::AwaitingReplay { from } => write!(f, "awaiting replay from {from}"),
        }
    }
}

/// What to do after the feed reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectAction {
    InSync,
    CatchUp { replay_from: u64 },
    Diverged(RewindPlan),
}

/// Tracks the indexed lineage and plans rewinds.
pub struct ReorgCoordinator {
    state: SyncState,
    cursor: ChainCursor,
    tracker: BlockTracker,
    target: Option<String>,
    epoch: u64,
    /// Height a replay has been requested from and not yet reached.
    pending_replay: Option<u64>,
}

impl ReorgCoordinator {
    /// Start from a persisted (or fresh) cursor.
    pub fn new(cursor: ChainCursor, window_size: usize) -> Self {
        let mut tracker = BlockTracker::new(window_size);
        if cursor.is_anchored() {
            tracker.reset(Some(BlockRef::new(
                cursor.best_height,
                cursor.best_hash.clone(),
                String::new(),
            )));
        }
        Self {
            state: SyncState::Synced,
            cursor,
            tracker,
            target: None,
            epoch: 0,
            pending_replay: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cursor(&self) -> &ChainCursor {
        &self.cursor
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Hash the current recovery is heading for.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Record that a replay from `height` has been requested.
    pub fn note_replay_requested(&mut self, height: u64) {
        self.pending_replay = Some(height);
    }

    /// Handle a reorg: the feed (or a detector) says the lineages share `ancestor`.
    ///
    /// The newest notification always wins; an in-flight recovery is abandoned.
    pub fn on_reorg(&mut self, ancestor: u64, new_tip_hash: String, cause: ReorgCause) -> RewindPlan {
        if matches!(self.state, SyncState::Rewinding | SyncState::Recovering) {
            tracing::warn!(
                state = %self.state,
                epoch = self.epoch,
                "abandoning in-flight recovery for newer reorg"
            );
        }

        self.epoch += 1;
        self.state = SyncState::Diverged;

        let plan = RewindPlan {
            ancestor: ancestor.min(self.cursor.best_height),
            previous_best: self.cursor.best_height,
            target_hash: new_tip_hash,
            cause,
            epoch: self.epoch,
        };

        tracing::warn!(
            ancestor = plan.ancestor,
            best = plan.previous_best,
            depth = plan.depth(),
            cause = %cause,
            epoch = plan.epoch,
            "chain diverged"
        );
        plan
    }

    /// Enter `Rewinding` and return the cursor the indexer should commit.
    pub fn begin_rewind(&mut self, plan: &RewindPlan) -> ChainCursor {
        self.state = SyncState::Rewinding;
        let hash = if plan.ancestor == self.cursor.best_height {
            self.cursor.best_hash.clone()
        } else {
            self.tracker
                .hash_at(plan.ancestor)
                .map(str::to_string)
                .unwrap_or_default()
        };
        self.cursor.rewound(plan.ancestor, hash)
    }

    /// Adopt the committed rewind cursor and enter `Recovering` (or `Synced`
    /// if the cursor already sits on the target).
    pub fn finish_rewind(&mut self, plan: &RewindPlan, cursor: ChainCursor) -> SyncState {
        if plan.epoch != self.epoch {
            tracing::debug!(plan = plan.epoch, current = self.epoch, "ignoring superseded rewind");
            return self.state;
        }

        self.tracker.rewind_to(cursor.best_height);
        if self.tracker.hash_at(cursor.best_height) != Some(cursor.best_hash.as_str()) {
            let anchor = cursor
                .is_anchored()
                .then(|| BlockRef::new(cursor.best_height, cursor.best_hash.clone(), String::new()));
            self.tracker.reset(anchor);
        }
        self.cursor = cursor;

        if self.cursor.is_anchored() && self.cursor.best_hash == plan.target_hash {
            self.state = SyncState::Synced;
            self.target = None;
            self.pending_replay = None;
        } else {
            self.state = SyncState::Recovering;
            self.target = Some(plan.target_hash.clone());
            self.pending_replay = Some(plan.replay_from());
        }
        self.state
    }

    /// Decide what to do with an arriving block.
    pub fn check_block(&mut self, block: &BlockRef) -> BlockVerdict {
        let next = self.cursor.next_height();

        if block.height > next {
            if self.pending_replay == Some(next) {
                return BlockVerdict::Stale(StaleReason::AwaitingReplay { from: next });
            }
            self.pending_replay = Some(next);
            return BlockVerdict::Gap { replay_from: next };
        }

        if block.height == next {
            if self.cursor.accepts(block) {
                return BlockVerdict::Apply;
            }
            let ancestor = self.fork_point(&block.parent_hash, block.height);
            return BlockVerdict::Diverged(self.on_reorg(
                ancestor,
                block.hash.clone(),
                ReorgCause::ParentMismatch,
            ));
        }

        match self.tracker.hash_at(block.height) {
            Some(hash) if hash == block.hash => BlockVerdict::Stale(StaleReason::AlreadyIndexed),
            None => BlockVerdict::Stale(StaleReason::BelowWindow),
            Some(_) => {
                let ancestor = self.fork_point(&block.parent_hash, block.height);
                BlockVerdict::Diverged(self.on_reorg(
                    ancestor,
                    block.hash.clone(),
                    ReorgCause::ParentMismatch,
                ))
            }
        }
    }

    /// Adopt the cursor the indexer committed for `block`.
    ///
    /// Returns `true` if this block completed a recovery.
    pub fn commit_block(&mut self, block: &BlockRef, cursor: ChainCursor) -> bool {
        if !self.tracker.push(block.clone()) {
            // Applied off a rewound or fresh anchor: restart the lineage here.
            self.tracker.reset(Some(block.clone()));
        }
        self.cursor = cursor;

        if self.pending_replay.is_some_and(|h| h <= block.height) {
            self.pending_replay = None;
        }

        if self.state == SyncState::Recovering && self.target.as_deref() == Some(block.hash.as_str()) {
            tracing::info!(height = block.height, epoch = self.epoch, "recovery complete");
            self.state = SyncState::Synced;
            self.target = None;
            return true;
        }
        false
    }

    /// Compare the tip reported after a feed reconnect with the cursor.
    pub fn on_reconnect(&mut self, tip: &BlockRef) -> ReconnectAction {
        let best = self.cursor.best_height;

        if tip.height > best {
            let from = self.cursor.next_height();
            self.pending_replay = Some(from);
            return ReconnectAction::CatchUp { replay_from: from };
        }
        if tip.height == best && tip.hash == self.cursor.best_hash {
            return ReconnectAction::InSync;
        }

        let ancestor = if self.tracker.hash_at(tip.height) == Some(tip.hash.as_str()) {
            tip.height
        } else {
            self.fork_point(&tip.parent_hash, tip.height)
        };
        ReconnectAction::Diverged(self.on_reorg(ancestor, tip.hash.clone(), ReorgCause::Reconnect))
    }

    /// Height of the last shared block for a block at `height` with `parent_hash`.
    ///
    /// Falls back to just below the tracked window when the parent is unknown.
    fn fork_point(&self, parent_hash: &str, height: u64) -> u64 {
        let below = height.saturating_sub(1);
        match self.tracker.height_of(parent_hash) {
            Some(h) if h < height => h,
            _ => self
                .tracker
                .oldest()
                .map(|b| b.height.saturating_sub(1))
                .unwrap_or(below)
                .min(below),
        }
    }
}
