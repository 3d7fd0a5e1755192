//! In-memory storage backend.
//!
//! Keeps jobs, proofs, content rows, and checkpoints in RAM behind a single
//! lock, so every [`TxWrite`] is applied atomically. Useful for tests and
//! short-lived indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use boostindex_core::checkpoint::{Checkpoint, CheckpointStore};
use boostindex_core::error::IndexerError;
use boostindex_core::store::{
    select_spender, IndexQuery, IndexStats, IndexStore, InvalidationPolicy, InvalidationReport, TxWrite,
    WriteOutcome,
};
use boostindex_core::types::{
    BlockStamp, Content, ContentRecord, ContentView, Job, JobFilter, JobRecord, Proof, ProofRecord, RecordKey,
};

#[derive(Default)]
struct IndexTables {
    jobs: BTreeMap<RecordKey, Job>,
    proofs: BTreeMap<RecordKey, Proof>,
    contents: BTreeMap<String, Content>,
}

/// In-memory index storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<IndexTables>,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

// ─── Write rules ──────────────────────────────────────────────────────────────

impl IndexTables {
    fn link_content(&mut self, txid: &str) -> bool {
        if self.contents.contains_key(txid) {
            return false;
        }
        self.contents.insert(txid.to_string(), Content::reference(txid));
        true
    }

    fn put_content(&mut self, record: &ContentRecord, block: Option<&BlockStamp>) -> bool {
        match self.contents.get_mut(&record.txid) {
            Some(content) => {
                content.on_chain = true;
                if content.protocol.is_none() {
                    content.protocol = record.protocol.clone();
                }
                if let Some(b) = block {
                    content.block = Some(b.clone());
                }
                false
            }
            None => {
                self.contents.insert(
                    record.txid.clone(),
                    Content {
                        txid: record.txid.clone(),
                        on_chain: true,
                        protocol: record.protocol.clone(),
                        block: block.cloned(),
                    },
                );
                true
            }
        }
    }

    fn put_job(&mut self, record: &JobRecord, block: Option<&BlockStamp>, out: &mut WriteOutcome) {
        let key = record.key();
        match self.jobs.get_mut(&key) {
            Some(job) => {
                match block {
                    Some(b) => job.block = Some(b.clone()),
                    None => job.mempool_seen = true,
                }
                out.jobs_updated += 1;
            }
            None => {
                self.jobs.insert(
                    key.clone(),
                    Job {
                        record: record.clone(),
                        block: block.cloned(),
                        mempool_seen: block.is_none(),
                        spent: false,
                        spent_txid: None,
                        spent_index: None,
                    },
                );
                out.jobs_inserted += 1;

                for proof in self.proofs.values_mut() {
                    if proof.content.is_none() && proof.record.job_key() == key {
                        tracing::debug!(proof = %proof.key(), job = %key, "forward reference resolved");
                        proof.content = Some(record.content.clone());
                    }
                }
            }
        }
        if self.refresh_spend(&key).is_some() {
            out.spends_changed += 1;
        }
    }

    fn put_proof(&mut self, record: &ProofRecord, block: Option<&BlockStamp>, out: &mut WriteOutcome) {
        let key = record.key();
        let job_key = record.job_key();
        let content = self.jobs.get(&job_key).map(|j| j.record.content.clone());

        match self.proofs.get_mut(&key) {
            Some(proof) => {
                match block {
                    Some(b) => proof.block = Some(b.clone()),
                    None => proof.mempool_seen = true,
                }
                if proof.content.is_none() {
                    proof.content = content;
                }
                out.proofs_updated += 1;
            }
            None => {
                if content.is_none() {
                    tracing::debug!(proof = %key, job = %job_key, "proof indexed before its job");
                    out.forward_refs += 1;
                }
                self.proofs.insert(
                    key,
                    Proof {
                        record: record.clone(),
                        content,
                        block: block.cloned(),
                        mempool_seen: block.is_none(),
                    },
                );
                out.proofs_inserted += 1;
            }
        }

        if block.is_some() {
            let dropped = self.evict_conflicts(record, out);
            out.double_spends_dropped += dropped;
        }
        if self.refresh_spend(&job_key).is_some() {
            out.spends_changed += 1;
        }
    }

    /// Drop unconfirmed records of every other transaction that spent the
    /// same job output as the confirmed `record`.
    fn evict_conflicts(&mut self, record: &ProofRecord, out: &mut WriteOutcome) -> usize {
        let job_key = record.job_key();
        let rivals: BTreeSet<String> = self
            .proofs
            .values()
            .filter(|p| p.block.is_none() && p.record.txid != record.txid && p.record.job_key() == job_key)
            .map(|p| p.record.txid.clone())
            .collect();

        let mut dropped = 0;
        let mut affected = BTreeSet::new();
        for txid in rivals {
            let before = self.proofs.len() + self.jobs.len();
            self.proofs.retain(|_, p| {
                let evict = p.record.txid == txid && p.block.is_none();
                if evict {
                    affected.insert(p.record.job_key());
                }
                !evict
            });
            self.jobs
                .retain(|_, j| !(j.record.txid == txid && j.block.is_none()));
            let n = before - (self.proofs.len() + self.jobs.len());
            tracing::warn!(
                winner = %record.txid,
                loser = %txid,
                job = %job_key,
                records = n,
                "double spend: dropping unconfirmed records"
            );
            dropped += n;
        }
        for key in affected {
            if self.refresh_spend(&key).is_some() {
                out.spends_changed += 1;
            }
        }
        dropped
    }

    /// Re-derive a job's spend fields from the proofs table.
    ///
    /// Returns the new spent flag if anything changed.
    fn refresh_spend(&mut self, key: &RecordKey) -> Option<bool> {
        let spender = select_spender(self.proofs.values().filter(|p| p.record.job_key() == *key))
            .map(|p| (p.record.txid.clone(), p.record.vin));
        let job = self.jobs.get_mut(key)?;
        let (spent_txid, spent_index) = match spender {
            Some((txid, vin)) => (Some(txid), Some(vin)),
            None => (None, None),
        };
        if job.spent_txid == spent_txid && job.spent_index == spent_index {
            return None;
        }
        job.spent = spent_txid.is_some();
        job.spent_txid = spent_txid;
        job.spent_index = spent_index;
        Some(job.spent)
    }

    fn invalidate(&mut self, from: u64, to: u64, policy: InvalidationPolicy) -> InvalidationReport {
        let in_range = |block: &Option<BlockStamp>| {
            block.as_ref().is_some_and(|b| b.height >= from && b.height <= to)
        };
        let mut report = InvalidationReport::default();

        self.jobs.retain(|_, job| {
            if !in_range(&job.block) {
                return true;
            }
            if policy.retains(job.mempool_seen) {
                job.block = None;
                report.jobs_unconfirmed += 1;
                true
            } else {
                report.jobs_removed += 1;
                false
            }
        });

        let mut affected = BTreeSet::new();
        self.proofs.retain(|_, proof| {
            if !in_range(&proof.block) {
                return true;
            }
            affected.insert(proof.record.job_key());
            if policy.retains(proof.mempool_seen) {
                proof.block = None;
                report.proofs_unconfirmed += 1;
                true
            } else {
                report.proofs_removed += 1;
                false
            }
        });

        for content in self.contents.values_mut() {
            if in_range(&content.block) {
                content.block = None;
                report.contents_unconfirmed += 1;
            }
        }

        for key in affected {
            if self.refresh_spend(&key) == Some(false) {
                report.spends_reversed += 1;
            }
        }
        report
    }
}

// ─── IndexQuery impl ──────────────────────────────────────────────────────────

#[async_trait]
impl IndexQuery for InMemoryStorage {
    async fn get_job(&self, txid: &str, vout: u32) -> Result<Option<Job>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.jobs.get(&RecordKey::new(txid, vout)).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.jobs.values().filter(|j| filter.matches(j)).count() as u64)
    }

    async fn get_proof(&self, txid: &str, vin: u32) -> Result<Option<Proof>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.proofs.get(&RecordKey::new(txid, vin)).cloned())
    }

    async fn proofs_for_job(&self, job_txid: &str, job_vout: u32) -> Result<Vec<Proof>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        let key = RecordKey::new(job_txid, job_vout);
        Ok(tables
            .proofs
            .values()
            .filter(|p| p.record.job_key() == key)
            .cloned()
            .collect())
    }

    async fn get_content(&self, txid: &str) -> Result<Option<Content>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.contents.get(txid).cloned())
    }

    async fn content_view(&self, txid: &str) -> Result<Option<ContentView>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        let Some(content) = tables.contents.get(txid).cloned() else {
            return Ok(None);
        };
        let jobs = tables
            .jobs
            .values()
            .filter(|j| j.record.content == txid)
            .cloned()
            .collect();
        let proofs = tables
            .proofs
            .values()
            .filter(|p| p.content.as_deref() == Some(txid))
            .cloned()
            .collect();
        Ok(Some(ContentView { content, jobs, proofs }))
    }

    async fn stats(&self) -> Result<IndexStats, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(IndexStats {
            jobs: tables.jobs.len() as u64,
            unconfirmed_jobs: tables.jobs.values().filter(|j| j.block.is_none()).count() as u64,
            spent_jobs: tables.jobs.values().filter(|j| j.spent).count() as u64,
            proofs: tables.proofs.len() as u64,
            dangling_proofs: tables
                .proofs
                .values()
                .filter(|p| !tables.jobs.contains_key(&p.record.job_key()))
                .count() as u64,
            contents: tables.contents.len() as u64,
        })
    }
}

// ─── IndexStore impl ──────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for InMemoryStorage {
    async fn apply(&self, write: &TxWrite) -> Result<WriteOutcome, IndexerError> {
        let mut tables = self.tables.lock().unwrap();
        let block = write.block.as_ref();
        let mut out = WriteOutcome::default();

        for record in &write.contents {
            if tables.put_content(record, block) {
                out.contents_created += 1;
            }
        }
        for content in &write.content_links {
            if tables.link_content(content) {
                out.contents_created += 1;
            }
        }
        for record in &write.jobs {
            tables.put_job(record, block, &mut out);
        }
        for record in &write.proofs {
            tables.put_proof(record, block, &mut out);
        }
        Ok(out)
    }

    async fn invalidate_range(
        &self,
        from: u64,
        to: u64,
        policy: InvalidationPolicy,
    ) -> Result<InvalidationReport, IndexerError> {
        Ok(self.tables.lock().unwrap().invalidate(from, to, policy))
    }

    async fn clear(&self) -> Result<(), IndexerError> {
        *self.tables.lock().unwrap() = IndexTables::default();
        Ok(())
    }
}

// ─── CheckpointStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let key = format!("{chain_id}:{indexer_id}");
        Ok(self.checkpoints.lock().unwrap().get(&key).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let key = format!("{}:{}", checkpoint.chain_id, checkpoint.indexer_id);
        self.checkpoints.lock().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        let key = format!("{chain_id}:{indexer_id}");
        self.checkpoints.lock().unwrap().remove(&key);
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(height: u64) -> Option<BlockStamp> {
        Some(BlockStamp {
            height,
            hash: format!("b{height}"),
            timestamp: 1_600_000_000 + height as i64,
        })
    }

    fn job(txid: &str, vout: u32, content: &str) -> JobRecord {
        JobRecord {
            txid: txid.into(),
            vout,
            content: content.into(),
            difficulty: 10.0,
            target_bits: 0x1c19999a,
            category: 0,
            tag: String::new(),
            additional_data: String::new(),
            user_nonce: 7,
            value: 5_000,
            script: "08626f6f7374706f7775".into(),
            miner_pubkey_hash: None,
        }
    }

    fn proof(txid: &str, vin: u32, job_txid: &str, job_vout: u32) -> ProofRecord {
        ProofRecord {
            txid: txid.into(),
            vin,
            job_txid: job_txid.into(),
            job_vout,
            signature: "30".into(),
            pubkey: "02".into(),
            nonce: 1,
            time: 2,
            extra_nonce_1: 3,
            extra_nonce_2: "04".into(),
            miner_pubkey_hash: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_stable() {
        let store = InMemoryStorage::new();
        let write = TxWrite::job(job("txA", 0, "c1"), stamp(100));

        let first = store.apply(&write).await.unwrap();
        assert_eq!(first.jobs_inserted, 1);
        assert_eq!(first.contents_created, 1);
        let snapshot = store.get_job("txA", 0).await.unwrap().unwrap();

        let second = store.apply(&write).await.unwrap();
        assert_eq!(second.jobs_inserted, 0);
        assert_eq!(second.contents_created, 0);
        assert_eq!(store.get_job("txA", 0).await.unwrap().unwrap(), snapshot);
        assert_eq!(store.stats().await.unwrap().jobs, 1);
    }

    #[tokio::test]
    async fn detection_fields_are_immutable() {
        let store = InMemoryStorage::new();
        store.apply(&TxWrite::job(job("txA", 0, "c1"), None)).await.unwrap();

        let mut altered = job("txA", 0, "c2");
        altered.difficulty = 99.0;
        store.apply(&TxWrite::job(altered, stamp(5))).await.unwrap();

        let stored = store.get_job("txA", 0).await.unwrap().unwrap();
        assert_eq!(stored.record.content, "c1");
        assert_eq!(stored.record.difficulty, 10.0);
        assert_eq!(stored.height(), Some(5));
    }

    #[tokio::test]
    async fn mempool_record_promoted_in_place() {
        let store = InMemoryStorage::new();
        store.apply(&TxWrite::job(job("txA", 0, "c1"), None)).await.unwrap();
        let pending = store.get_job("txA", 0).await.unwrap().unwrap();
        assert!(pending.block.is_none());
        assert!(pending.mempool_seen);

        store.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();
        let confirmed = store.get_job("txA", 0).await.unwrap().unwrap();
        assert_eq!(confirmed.height(), Some(100));
        assert!(confirmed.mempool_seen);

        // A late mempool sighting must not unconfirm it.
        store.apply(&TxWrite::job(job("txA", 0, "c1"), None)).await.unwrap();
        assert_eq!(store.get_job("txA", 0).await.unwrap().unwrap().height(), Some(100));
        assert_eq!(store.stats().await.unwrap().jobs, 1);
    }

    #[tokio::test]
    async fn forward_reference_resolves() {
        let proof_first = InMemoryStorage::new();
        let out = proof_first.apply(&TxWrite::proof(proof("txB", 0, "txA", 0), None)).await.unwrap();
        assert_eq!(out.forward_refs, 1);
        assert_eq!(proof_first.stats().await.unwrap().dangling_proofs, 1);
        proof_first.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();

        let job_first = InMemoryStorage::new();
        job_first.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();
        job_first.apply(&TxWrite::proof(proof("txB", 0, "txA", 0), None)).await.unwrap();

        for store in [&proof_first, &job_first] {
            let j = store.get_job("txA", 0).await.unwrap().unwrap();
            assert!(j.spent);
            assert_eq!(j.spent_txid.as_deref(), Some("txB"));
            assert_eq!(j.spent_index, Some(0));
            let p = store.get_proof("txB", 0).await.unwrap().unwrap();
            assert_eq!(p.content.as_deref(), Some("c1"));
        }
    }

    #[tokio::test]
    async fn jobs_and_proofs_share_txid_without_colliding() {
        let store = InMemoryStorage::new();
        let write = TxWrite {
            txid: "txC".into(),
            block: stamp(7),
            content_links: vec!["c1".into()],
            jobs: vec![job("txC", 0, "c1")],
            proofs: vec![proof("txC", 0, "txA", 1)],
            ..Default::default()
        };
        store.apply(&write).await.unwrap();
        assert!(store.get_job("txC", 0).await.unwrap().is_some());
        assert!(store.get_proof("txC", 0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidation_policies() {
        for (policy, job_survives) in [
            (InvalidationPolicy::RetainMempoolWitnessed, true),
            (InvalidationPolicy::RemoveAll, false),
        ] {
            let store = InMemoryStorage::new();
            store.apply(&TxWrite::job(job("seen", 0, "c1"), None)).await.unwrap();
            store.apply(&TxWrite::job(job("seen", 0, "c1"), stamp(101))).await.unwrap();
            store.apply(&TxWrite::job(job("blind", 0, "c1"), stamp(102))).await.unwrap();
            store.apply(&TxWrite::job(job("old", 0, "c1"), stamp(99))).await.unwrap();

            let report = store.invalidate_range(100, 105, policy).await.unwrap();
            assert_eq!(report.jobs_removed + report.jobs_unconfirmed, 2);

            assert!(store.get_job("blind", 0).await.unwrap().is_none());
            assert_eq!(store.get_job("old", 0).await.unwrap().unwrap().height(), Some(99));
            let seen = store.get_job("seen", 0).await.unwrap();
            assert_eq!(seen.is_some(), job_survives);
            if let Some(seen) = seen {
                assert!(seen.block.is_none());
            }
            // Content rows are never removed by a reorg.
            assert!(store.get_content("c1").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn invalidation_reverses_spend() {
        let store = InMemoryStorage::new();
        store.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();
        store.apply(&TxWrite::proof(proof("txB", 0, "txA", 0), stamp(101))).await.unwrap();
        assert!(store.get_job("txA", 0).await.unwrap().unwrap().spent);

        let report = store
            .invalidate_range(101, 101, InvalidationPolicy::RetainMempoolWitnessed)
            .await
            .unwrap();
        assert_eq!(report.proofs_removed, 1);
        assert_eq!(report.spends_reversed, 1);

        let j = store.get_job("txA", 0).await.unwrap().unwrap();
        assert!(!j.spent);
        assert!(j.spent_txid.is_none());
        assert_eq!(j.height(), Some(100));
    }

    #[tokio::test]
    async fn unconfirmed_proof_keeps_spend_mark() {
        let store = InMemoryStorage::new();
        store.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();
        store.apply(&TxWrite::proof(proof("txB", 0, "txA", 0), None)).await.unwrap();
        store.apply(&TxWrite::proof(proof("txB", 0, "txA", 0), stamp(101))).await.unwrap();

        let report = store
            .invalidate_range(101, 200, InvalidationPolicy::RetainMempoolWitnessed)
            .await
            .unwrap();
        assert_eq!(report.proofs_unconfirmed, 1);
        assert_eq!(report.spends_reversed, 0);
        let j = store.get_job("txA", 0).await.unwrap().unwrap();
        assert_eq!(j.spent_txid.as_deref(), Some("txB"));
    }

    #[tokio::test]
    async fn confirmed_proof_drops_double_spend() {
        let store = InMemoryStorage::new();
        store.apply(&TxWrite::job(job("txA", 0, "c1"), stamp(100))).await.unwrap();

        // txR spends txA:0 in the mempool and creates its own job.
        let rival = TxWrite {
            txid: "txR".into(),
            content_links: vec!["c2".into()],
            jobs: vec![job("txR", 0, "c2")],
            proofs: vec![proof("txR", 0, "txA", 0)],
            ..Default::default()
        };
        store.apply(&rival).await.unwrap();
        assert_eq!(
            store.get_job("txA", 0).await.unwrap().unwrap().spent_txid.as_deref(),
            Some("txR")
        );

        // txW wins in a block.
        let out = store.apply(&TxWrite::proof(proof("txW", 0, "txA", 0), stamp(101))).await.unwrap();
        assert_eq!(out.double_spends_dropped, 2);
        assert!(store.get_proof("txR", 0).await.unwrap().is_none());
        assert!(store.get_job("txR", 0).await.unwrap().is_none());
        let j = store.get_job("txA", 0).await.unwrap().unwrap();
        assert_eq!(j.spent_txid.as_deref(), Some("txW"));
        assert_eq!(store.proofs_for_job("txA", 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queries() {
        let store = InMemoryStorage::new();
        let mut tagged = job("t2", 1, "c1");
        tagged.tag = "ab".into();
        tagged.category = 4;
        store.apply(&TxWrite::job(job("t1", 0, "c1"), stamp(1))).await.unwrap();
        store.apply(&TxWrite::job(tagged, stamp(1))).await.unwrap();
        store.apply(&TxWrite::job(job("t3", 0, "c2"), stamp(2))).await.unwrap();
        store.apply(&TxWrite::proof(proof("p1", 0, "t1", 0), stamp(3))).await.unwrap();
        store
            .apply(&TxWrite {
                txid: "c1".into(),
                block: stamp(1),
                contents: vec![ContentRecord {
                    txid: "c1".into(),
                    vout: 0,
                    protocol: Some("B".into()),
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let c1 = store.list_jobs(&JobFilter::content("c1")).await.unwrap();
        assert_eq!(c1.iter().map(|j| j.record.txid.as_str()).collect::<Vec<_>>(), ["t1", "t2"]);
        assert_eq!(store.count_jobs(&JobFilter::default().spent(false)).await.unwrap(), 2);
        assert_eq!(store.list_jobs(&JobFilter::default().limit(1)).await.unwrap().len(), 1);
        let by_tag = JobFilter {
            tag: Some("ab".into()),
            category: Some(4),
            ..Default::default()
        };
        assert_eq!(store.count_jobs(&by_tag).await.unwrap(), 1);

        let view = store.content_view("c1").await.unwrap().unwrap();
        assert!(view.content.on_chain);
        assert_eq!(view.content.protocol.as_deref(), Some("B"));
        assert_eq!(view.jobs.len(), 2);
        assert_eq!(view.proofs.len(), 1);
        assert!(store.content_view("nope").await.unwrap().is_none());

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), IndexStats::default());
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = InMemoryStorage::new();
        let cp = Checkpoint {
            chain_id: "bsv".into(),
            indexer_id: "test".into(),
            height: 1000,
            block_hash: "abc".into(),
            updated_at: 0,
        };
        store.save(cp).await.unwrap();
        let loaded = store.load("bsv", "test").await.unwrap().unwrap();
        assert_eq!(loaded.height, 1000);
        store.clear().await.unwrap();
        assert!(store.load("bsv", "test").await.unwrap().is_some());
    }
}
