//! A [`ChainFeed`] over a JSON-lines file of recorded chain events.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;

use boostindex_bsv::{ChainEvent, ChainFeed};
use boostindex_core::error::IndexerError;

/// Plays back one `ChainEvent` per line, in file order.
///
/// A recording cannot rewind, so replay requests are only logged; blocks the
/// index is not ready for are reported by the loop as gaps or stale blocks.
pub struct FileFeed {
    events: VecDeque<ChainEvent>,
    pub replays: Vec<u64>,
}

impl FileFeed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut events = VecDeque::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event: ChainEvent = serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
            events.push_back(event);
        }
        Ok(Self {
            events,
            replays: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl ChainFeed for FileFeed {
    async fn next_event(&mut self) -> Option<ChainEvent> {
        self.events.pop_front()
    }

    async fn replay_from(&mut self, height: u64) -> Result<(), IndexerError> {
        tracing::info!(height, pending = self.events.len(), "replay requested from recorded feed");
        self.replays.push(height);
        Ok(())
    }
}
