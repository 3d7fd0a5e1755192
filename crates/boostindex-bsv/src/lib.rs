//! boostindex-bsv — chain feed, Boost write path and index loop.

pub mod builder;
pub mod feed;
pub mod index_loop;
pub mod indexer;

pub use builder::IndexerBuilder;
pub use feed::{ChainEvent, ChainFeed, ChannelFeed, FeedSender};
pub use index_loop::{IndexLoop, IndexLoopEvent, LoopStats};
pub use indexer::{BlockReport, Indexer};
