//! Checkpoint manager — persists the chain cursor for crash recovery.
//!
//! A checkpoint stores the last fully committed block height and hash. On
//! restart the index loop resumes from it instead of re-indexing from the
//! start height.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::ChainCursor;
use crate::error::IndexerError;

/// A persisted checkpoint for an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"bsv"`).
    pub chain_id: String,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last fully committed block height.
    pub height: u64,
    /// Hash of that block; empty if the cursor is not anchored yet.
    pub block_hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn cursor(&self) -> ChainCursor {
        ChainCursor::new(self.height, self.block_hash.clone())
    }
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest checkpoint for a given chain + indexer pair.
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Manages cursor reads/writes for one indexer.
pub struct CheckpointManager<S: ?Sized> {
    store: Arc<S>,
    chain_id: String,
    indexer_id: String,
    /// How often to save (every N blocks).
    save_interval: u64,
    /// Block counter since last save.
    counter: u64,
}

impl<S: CheckpointStore + ?Sized> CheckpointManager<S> {
    pub fn new(
        store: Arc<S>,
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            counter: 0,
        }
    }

    /// Load the saved cursor (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<ChainCursor>, IndexerError> {
        Ok(self
            .store
            .load(&self.chain_id, &self.indexer_id)
            .await?
            .map(|cp| cp.cursor()))
    }

    /// Count one committed block. Returns `true` when a save is due.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.save_interval {
            self.counter = 0;
            return true;
        }
        false
    }

    /// Immediately save (used after every due tick and after rewinds).
    pub async fn force_save(&self, cursor: &ChainCursor) -> Result<(), IndexerError> {
        let cp = Checkpoint {
            chain_id: self.chain_id.clone(),
            indexer_id: self.indexer_id.clone(),
            height: cursor.best_height,
            block_hash: cursor.best_hash.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await?;
        tracing::debug!(
            height = cursor.best_height,
            hash = %cursor.best_hash,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Forget the saved cursor.
    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.store.delete(&self.chain_id, &self.indexer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        data: Mutex<HashMap<String, Checkpoint>>,
    }

    #[async_trait]
    impl CheckpointStore for MapStore {
        async fn load(&self, chain_id: &str, indexer_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
            Ok(self.data.lock().unwrap().get(&format!("{chain_id}:{indexer_id}")).cloned())
        }

        async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
            let key = format!("{}:{}", checkpoint.chain_id, checkpoint.indexer_id);
            self.data.lock().unwrap().insert(key, checkpoint);
            Ok(())
        }

        async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
            self.data.lock().unwrap().remove(&format!("{chain_id}:{indexer_id}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let mgr = CheckpointManager::new(Arc::new(MapStore::default()), "bsv", "boost", 10);
        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(&ChainCursor::new(1000, "abc")).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), Some(ChainCursor::new(1000, "abc")));

        mgr.reset().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());
    }

    #[test]
    fn save_interval() {
        let mut mgr = CheckpointManager::new(Arc::new(MapStore::default()), "bsv", "idx", 5);

        for _ in 1..=4 {
            assert!(!mgr.tick());
        }
        assert!(mgr.tick());
        // Counter restarts after a due tick.
        assert!(!mgr.tick());
    }

    #[tokio::test]
    async fn unanchored_cursor_survives() {
        let mgr = CheckpointManager::new(Arc::new(MapStore::default()), "bsv", "idx", 1);
        mgr.force_save(&ChainCursor::unanchored(700)).await.unwrap();
        let cursor = mgr.load().await.unwrap().unwrap();
        assert!(!cursor.is_anchored());
        assert_eq!(cursor.next_height(), 700);
    }
}
