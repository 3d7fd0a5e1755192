//! Block tracker — maintains a sliding window of recently indexed block
//! references for parent-hash verification and common-ancestor lookup.

use std::collections::VecDeque;

use crate::types::BlockRef;

/// Tracks the last N indexed blocks.
///
/// When a block arrives whose `parent_hash` is not the hash of the window head,
/// the tracker can tell how far back the fork point lies, as long as it is
/// still inside the window.
pub struct BlockTracker {
    /// Sliding window of recent blocks (oldest first).
    window: VecDeque<BlockRef>,
    /// Maximum number of blocks to retain.
    window_size: usize,
}

impl BlockTracker {
    /// Create a new tracker with the given window size.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
        }
    }

    /// Add a new block to the tracker.
    ///
    /// Returns `false`, leaving the window untouched, if the block does not
    /// extend the current head.
    #[must_use]
    pub fn push(&mut self, block: BlockRef) -> bool {
        if let Some(head) = self.window.back() {
            if !block.extends(head) {
                return false;
            }
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(block);
        true
    }

    /// Returns the current head (most recently added block).
    pub fn head(&self) -> Option<&BlockRef> {
        self.window.back()
    }

    /// Returns the oldest tracked block.
    pub fn oldest(&self) -> Option<&BlockRef> {
        self.window.front()
    }

    /// Returns a block by height if it's in the window.
    pub fn get(&self, height: u64) -> Option<&BlockRef> {
        self.window.iter().rev().find(|b| b.height == height)
    }

    /// Hash of the tracked block at `height`.
    pub fn hash_at(&self, height: u64) -> Option<&str> {
        self.get(height).map(|b| b.hash.as_str())
    }

    /// Height of the tracked block with the given hash.
    pub fn height_of(&self, hash: &str) -> Option<u64> {
        self.window.iter().rev().find(|b| b.hash == hash).map(|b| b.height)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard every block above `height`.
    pub fn rewind_to(&mut self, height: u64) {
        while let Some(back) = self.window.back() {
            if back.height > height {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }

    /// Replace the window with a single anchor block (used on resume).
    pub fn reset(&mut self, anchor: Option<BlockRef>) {
        self.window.clear();
        self.window.extend(anchor);
    }
}
