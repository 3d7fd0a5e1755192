//! The Boost write path.
//!
//! The [`Indexer`] is the only writer of the index. It classifies each
//! transaction, turns the detections into one atomic [`TxWrite`] and applies
//! it with retry. Block commits hand back the advanced cursor; the caller
//! (the index loop, via the reorg coordinator) owns it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use boostindex_core::cursor::ChainCursor;
use boostindex_core::detector::PatternDetector;
use boostindex_core::error::IndexerError;
use boostindex_core::reorg::RewindPlan;
use boostindex_core::retry::RetryPolicy;
use boostindex_core::store::{IndexStore, InvalidationPolicy, InvalidationReport, TxWrite, WriteOutcome};
use boostindex_core::types::{Block, BlockStamp, JobRecord, ProofRecord, RawTransaction};

/// Summary of one committed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub height: u64,
    pub hash: String,
    pub transactions: usize,
    /// Transactions that produced at least one job, proof or content record.
    pub matched: usize,
    pub outcome: WriteOutcome,
}

/// Detects Boost records and writes them to an [`IndexStore`].
#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn IndexStore>,
    detector: PatternDetector,
    retry: RetryPolicy,
    policy: InvalidationPolicy,
}

impl Indexer {
    pub fn new(store: Arc<dyn IndexStore>, retry: RetryPolicy, policy: InvalidationPolicy) -> Self {
        Self {
            store,
            detector: PatternDetector::new(),
            retry,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn invalidation_policy(&self) -> InvalidationPolicy {
        self.policy
    }

    // ─── Record-level operations ─────────────────────────────────────────────

    /// Insert a job, or refresh the block attribution of an existing one.
    pub async fn upsert_job(&self, record: JobRecord, block: Option<BlockStamp>) -> Result<WriteOutcome, IndexerError> {
        let write = TxWrite::job(record, block);
        self.apply(&write).await
    }

    /// Insert a proof and mark the job it spends. A proof whose job is not
    /// indexed yet is kept as a forward reference.
    pub async fn upsert_proof(
        &self,
        record: ProofRecord,
        block: Option<BlockStamp>,
    ) -> Result<WriteOutcome, IndexerError> {
        let write = TxWrite::proof(record, block);
        self.apply(&write).await
    }

    /// Make sure a content row exists. Returns `true` if it was created.
    pub async fn link_content(&self, content: &str) -> Result<bool, IndexerError> {
        let outcome = self.apply(&TxWrite::link(content)).await?;
        Ok(outcome.contents_created > 0)
    }

    /// Remove or unconfirm everything attributed to `[from, to]`.
    pub async fn invalidate_range(&self, from: u64, to: u64) -> Result<InvalidationReport, IndexerError> {
        let policy = self.policy;
        let store = &self.store;
        self.retry
            .run("invalidate", from, move || async move {
                store.invalidate_range(from, to, policy).await
            })
            .await
    }

    // ─── Transaction and block paths ─────────────────────────────────────────

    /// Classify one transaction and write what it carries.
    ///
    /// `block` is `None` for mempool transactions.
    pub async fn index_transaction(
        &self,
        tx: &RawTransaction,
        block: Option<&BlockStamp>,
    ) -> Result<WriteOutcome, IndexerError> {
        let detections = self.detector.detect_raw(&tx.txid, &tx.raw);
        if detections.is_empty() {
            return Ok(WriteOutcome::default());
        }
        let write = TxWrite::from_detections(&detections, block.cloned());
        let outcome = self.apply(&write).await?;

        if outcome.forward_refs > 0 {
            tracing::debug!(
                txid = %write.txid,
                forward_refs = outcome.forward_refs,
                "proof indexed before its job"
            );
        }
        Ok(outcome)
    }

    /// Index every transaction of `block` and return the advanced cursor.
    ///
    /// The block must extend `cursor`; anything else is refused before a
    /// single record is written.
    pub async fn index_block(
        &self,
        block: &Block,
        cursor: &ChainCursor,
    ) -> Result<(ChainCursor, BlockReport), IndexerError> {
        let header = &block.header;
        if header.height != cursor.next_height() {
            return Err(IndexerError::InvalidBlock {
                height: header.height,
                reason: format!("expected height {}", cursor.next_height()),
            });
        }
        if !cursor.accepts(header) {
            return Err(IndexerError::ReorgDetected {
                height: header.height,
                expected: cursor.best_hash.clone(),
                actual: header.parent_hash.clone(),
            });
        }

        let stamp = block.stamp();
        let mut report = BlockReport {
            height: header.height,
            hash: header.hash.clone(),
            transactions: block.transactions.len(),
            ..Default::default()
        };

        for tx in &block.transactions {
            let detections = self.detector.detect_raw(&tx.txid, &tx.raw);
            if detections.is_empty() {
                continue;
            }
            report.matched += 1;
            let write = TxWrite::from_detections(&detections, Some(stamp.clone()));
            let outcome = self.apply(&write).await?;
            report.outcome.merge(&outcome);
        }

        tracing::info!(
            height = header.height,
            hash = %header.hash,
            txs = report.transactions,
            matched = report.matched,
            jobs = report.outcome.jobs_inserted + report.outcome.jobs_updated,
            proofs = report.outcome.proofs_inserted + report.outcome.proofs_updated,
            "block indexed"
        );
        Ok((cursor.advanced(header), report))
    }

    /// Invalidate the range a rewind plan rolls back.
    pub async fn rewind(&self, plan: &RewindPlan) -> Result<InvalidationReport, IndexerError> {
        let Some((from, to)) = plan.invalidation_range() else {
            return Ok(InvalidationReport::default());
        };
        let report = self.invalidate_range(from, to).await?;
        tracing::warn!(
            from,
            to,
            epoch = plan.epoch,
            removed = report.jobs_removed + report.proofs_removed,
            unconfirmed = report.jobs_unconfirmed + report.proofs_unconfirmed,
            spends_reversed = report.spends_reversed,
            "invalidated orphaned range"
        );
        Ok(report)
    }

    /// Drop everything attributed above `height` (left over from a crash
    /// between a block's record writes and its cursor save).
    pub async fn purge_above(&self, height: u64) -> Result<InvalidationReport, IndexerError> {
        let report = self.invalidate_range(height.saturating_add(1), u64::MAX).await?;
        if report.touched() > 0 {
            tracing::warn!(height, touched = report.touched(), "purged records above persisted cursor");
        }
        Ok(report)
    }

    async fn apply(&self, write: &TxWrite) -> Result<WriteOutcome, IndexerError> {
        let height = write.height().unwrap_or(0);
        let store = &self.store;
        self.retry
            .run("apply", height, move || async move { store.apply(write).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boostindex_core::pattern::{encode_job_script, encode_proof_script, JobScript, ProofScript};
    use boostindex_core::retry::RetryConfig;
    use boostindex_core::store::IndexQuery;
    use boostindex_core::tx;
    use boostindex_core::ScriptBuf;
    use boostindex_core::types::BlockRef;
    use boostindex_storage::InMemoryStorage;

    fn indexer(store: Arc<InMemoryStorage>) -> Indexer {
        Indexer::new(store, RetryPolicy::new(RetryConfig::default()), InvalidationPolicy::default())
    }

    fn job_tx(content: [u8; 32]) -> RawTransaction {
        let script = encode_job_script(&JobScript {
            miner_pubkey_hash: None,
            category: 0,
            content,
            target_bits: 0x1d00ffff,
            tag: b"tag".to_vec(),
            user_nonce: 1,
            additional_data: vec![],
        })
        .unwrap();
        let spend = tx::spend(&"11".repeat(32), 0, ScriptBuf::from_bytes(vec![0x51])).unwrap();
        RawTransaction::from(&tx::assemble(vec![spend], vec![tx::output(5_000, script)]))
    }

    fn proof_tx(job_txid: &str) -> RawTransaction {
        let script_sig = encode_proof_script(&ProofScript {
            signature: vec![0x30; 71],
            pubkey: vec![0x02; 33],
            nonce: 7,
            time: 1_600_000_000,
            extra_nonce_2: vec![0; 8],
            extra_nonce_1: 3,
            miner_pubkey_hash: None,
        })
        .unwrap();
        let spend = tx::spend(job_txid, 0, script_sig).unwrap();
        let change = tx::output(4_000, ScriptBuf::from_bytes(vec![0x51]));
        RawTransaction::from(&tx::assemble(vec![spend], vec![change]))
    }

    fn raw(tx: &RawTransaction) -> RawTransaction {
        tx.clone()
    }

    fn block(height: u64, hash: &str, parent: &str, txs: &[&RawTransaction]) -> Block {
        Block {
            header: BlockRef::new(height, hash, parent),
            timestamp: 1_600_000_000 + height as i64,
            transactions: txs.iter().map(|t| raw(t)).collect(),
        }
    }

    #[tokio::test]
    async fn block_then_mempool_proof() {
        let store = Arc::new(InMemoryStorage::new());
        let idx = indexer(store.clone());
        let tx_a = job_tx([0xc1; 32]);
        let tx_b = proof_tx(&tx_a.txid);

        let (cursor, report) = idx
            .index_block(&block(100, "h100", "h99", &[&tx_a]), &ChainCursor::new(99, "h99"))
            .await
            .unwrap();
        assert_eq!(cursor, ChainCursor::new(100, "h100"));
        assert_eq!(report.matched, 1);
        assert_eq!(report.outcome.jobs_inserted, 1);

        let job = store.get_job(&tx_a.txid, 0).await.unwrap().unwrap();
        assert!(!job.spent);
        assert_eq!(job.height(), Some(100));

        idx.index_transaction(&raw(&tx_b), None).await.unwrap();
        let job = store.get_job(&tx_a.txid, 0).await.unwrap().unwrap();
        assert!(job.spent);
        assert_eq!(job.spent_txid.as_deref(), Some(tx_b.txid.as_str()));
        assert_eq!(job.spent_index, Some(0));
    }

    #[tokio::test]
    async fn refuses_blocks_off_the_cursor() {
        let idx = indexer(Arc::new(InMemoryStorage::new()));
        let cursor = ChainCursor::new(10, "h10");

        let err = idx.index_block(&block(11, "h11", "x10", &[]), &cursor).await.unwrap_err();
        assert!(err.is_reorg());

        let err = idx.index_block(&block(13, "h13", "h12", &[]), &cursor).await.unwrap_err();
        assert!(matches!(err, IndexerError::InvalidBlock { height: 13, .. }));
    }

    #[tokio::test]
    async fn unmatched_transactions_write_nothing() {
        let store = Arc::new(InMemoryStorage::new());
        let idx = indexer(store.clone());
        let junk = RawTransaction {
            txid: "ff".repeat(32),
            raw: vec![1, 2, 3],
        };
        assert_eq!(idx.index_transaction(&junk, None).await.unwrap(), WriteOutcome::default());
        assert_eq!(store.stats().await.unwrap(), Default::default());
    }

    #[tokio::test]
    async fn link_content_is_idempotent() {
        let idx = indexer(Arc::new(InMemoryStorage::new()));
        assert!(idx.link_content("c1").await.unwrap());
        assert!(!idx.link_content("c1").await.unwrap());
    }

    #[tokio::test]
    async fn purge_above_drops_uncommitted_heights() {
        let store = Arc::new(InMemoryStorage::new());
        let idx = indexer(store.clone());
        let tx_a = job_tx([0xc2; 32]);
        idx.index_block(&block(5, "h5", "h4", &[&tx_a]), &ChainCursor::new(4, "h4"))
            .await
            .unwrap();

        let report = idx.purge_above(4).await.unwrap();
        assert_eq!(report.jobs_removed, 1);
        assert!(store.get_job(&tx_a.txid, 0).await.unwrap().is_none());
    }
}
