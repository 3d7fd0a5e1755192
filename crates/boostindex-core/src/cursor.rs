//! Chain cursor — how much of the chain has been indexed.

use serde::{Deserialize, Serialize};

use crate::types::BlockRef;

/// The index's position in the chain.
///
/// Owned by the reorg coordinator and handed to the indexer for each commit.
/// No record may be attributed to a height above `best_height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCursor {
    /// Last block whose records are fully committed.
    pub best_height: u64,
    /// Hash of that block. Empty until the first block anchors the cursor.
    pub best_hash: String,
}

impl ChainCursor {
    pub fn new(best_height: u64, best_hash: impl Into<String>) -> Self {
        Self {
            best_height,
            best_hash: best_hash.into(),
        }
    }

    /// A cursor for an empty index that will start at `start_height`.
    ///
    /// The first block accepted anchors the lineage, whatever its parent.
    pub fn unanchored(start_height: u64) -> Self {
        Self {
            best_height: start_height.saturating_sub(1),
            best_hash: String::new(),
        }
    }

    /// Returns `true` once a block hash is known at `best_height`.
    pub fn is_anchored(&self) -> bool {
        !self.best_hash.is_empty()
    }

    /// The next height to index.
    pub fn next_height(&self) -> u64 {
        self.best_height + 1
    }

    /// Returns `true` if `block` is the next block on this cursor's lineage.
    pub fn accepts(&self, block: &BlockRef) -> bool {
        block.height == self.next_height()
            && (!self.is_anchored() || block.parent_hash == self.best_hash)
    }

    /// The cursor after committing `block`.
    pub fn advanced(&self, block: &BlockRef) -> Self {
        Self::new(block.height, block.hash.clone())
    }

    /// The cursor after rewinding to `height` (hash may be empty if unknown).
    pub fn rewound(&self, height: u64, hash: impl Into<String>) -> Self {
        Self::new(height.min(self.best_height), hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let cursor = ChainCursor::new(100, "aa");
        let next = cursor.advanced(&BlockRef::new(101, "bb", "aa"));
        assert_eq!(next.best_height, 101);
        assert_eq!(next.best_hash, "bb");
        assert_eq!(next.next_height(), 102);
    }

    #[test]
    fn cursor_accepts_only_its_child() {
        let cursor = ChainCursor::new(100, "aa");
        assert!(cursor.accepts(&BlockRef::new(101, "bb", "aa")));
        assert!(!cursor.accepts(&BlockRef::new(101, "bb", "zz")));
        assert!(!cursor.accepts(&BlockRef::new(102, "cc", "bb")));
        assert!(!cursor.accepts(&BlockRef::new(100, "aa", "99")));
    }

    #[test]
    fn unanchored_accepts_any_parent() {
        let cursor = ChainCursor::unanchored(500);
        assert!(!cursor.is_anchored());
        assert_eq!(cursor.next_height(), 500);
        assert!(cursor.accepts(&BlockRef::new(500, "x", "whatever")));
        assert!(!cursor.accepts(&BlockRef::new(501, "y", "x")));
    }

    #[test]
    fn rewind_never_moves_forward() {
        let cursor = ChainCursor::new(100, "aa");
        assert_eq!(cursor.rewound(95, "95").best_height, 95);
        assert_eq!(cursor.rewound(120, "").best_height, 100);
    }
}
