//! Chain feed boundary.
//!
//! The upstream listener (SPV, P2P, node RPC) pushes [`ChainEvent`]s; the
//! index loop pulls them one at a time from a single ordered queue. The only
//! call the loop makes back into the feed is [`ChainFeed::replay_from`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use boostindex_core::error::IndexerError;
use boostindex_core::types::{Block, BlockRef, RawTransaction};

/// Everything the feed can report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A block on the feed's best chain (live or replayed).
    NewBlock(Block),
    /// An unconfirmed transaction.
    MempoolTx(RawTransaction),
    /// The feed switched lineage; both chains share `common_ancestor_height`.
    Reorg {
        common_ancestor_height: u64,
        new_tip_hash: String,
    },
    /// The upstream connection dropped.
    Disconnected { reason: String },
    /// The upstream connection is back; `tip` is the feed's current best block.
    Reconnected { tip: BlockRef },
}

impl ChainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewBlock(_) => "block",
            Self::MempoolTx(_) => "mempool",
            Self::Reorg { .. } => "reorg",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnected { .. } => "reconnected",
        }
    }
}

/// A source of ordered chain events.
#[async_trait]
pub trait ChainFeed: Send {
    /// Wait for the next event. `None` means the feed has shut down.
    async fn next_event(&mut self) -> Option<ChainEvent>;

    /// Ask the feed to deliver blocks from `height` onward on its current best chain.
    async fn replay_from(&mut self, height: u64) -> Result<(), IndexerError>;
}

// ─── Channel feed ────────────────────────────────────────────────────────────

/// A [`ChainFeed`] backed by a bounded tokio channel.
///
/// The listener side holds a [`FeedSender`] and drains replay requests from
/// the receiver returned by [`ChannelFeed::new`].
pub struct ChannelFeed {
    events: mpsc::Receiver<ChainEvent>,
    replays: mpsc::UnboundedSender<u64>,
}

/// Producer half of a [`ChannelFeed`].
#[derive(Clone)]
pub struct FeedSender {
    events: mpsc::Sender<ChainEvent>,
}

impl ChannelFeed {
    /// Create a feed with room for `buffer` pending events.
    pub fn new(buffer: usize) -> (Self, FeedSender, mpsc::UnboundedReceiver<u64>) {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        let (replay_tx, replay_rx) = mpsc::unbounded_channel();
        (
            Self {
                events: event_rx,
                replays: replay_tx,
            },
            FeedSender { events: event_tx },
            replay_rx,
        )
    }
}

#[async_trait]
impl ChainFeed for ChannelFeed {
    async fn next_event(&mut self) -> Option<ChainEvent> {
        self.events.recv().await
    }

    async fn replay_from(&mut self, height: u64) -> Result<(), IndexerError> {
        self.replays
            .send(height)
            .map_err(|_| IndexerError::Feed(format!("replay from {height} not deliverable: listener gone")))
    }
}

impl FeedSender {
    /// Queue an event, waiting while the buffer is full.
    pub async fn send(&self, event: ChainEvent) -> Result<(), IndexerError> {
        self.events
            .send(event)
            .await
            .map_err(|e| IndexerError::Feed(format!("index loop gone, dropped {} event", e.0.kind())))
    }

    pub async fn new_block(&self, block: Block) -> Result<(), IndexerError> {
        self.send(ChainEvent::NewBlock(block)).await
    }

    pub async fn mempool_tx(&self, tx: RawTransaction) -> Result<(), IndexerError> {
        self.send(ChainEvent::MempoolTx(tx)).await
    }

    pub async fn reorg(&self, common_ancestor_height: u64, new_tip_hash: impl Into<String>) -> Result<(), IndexerError> {
        self.send(ChainEvent::Reorg {
            common_ancestor_height,
            new_tip_hash: new_tip_hash.into(),
        })
        .await
    }

    pub async fn disconnected(&self, reason: impl Into<String>) -> Result<(), IndexerError> {
        self.send(ChainEvent::Disconnected { reason: reason.into() }).await
    }

    pub async fn reconnected(&self, tip: BlockRef) -> Result<(), IndexerError> {
        self.send(ChainEvent::Reconnected { tip }).await
    }
}
