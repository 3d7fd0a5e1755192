//! Persistence boundary — the write batch and the store traits.
//!
//! The indexer is the only writer. It hands the store one [`TxWrite`] per
//! transaction and the store applies it atomically, so a read never sees a job
//! without its content row or a proof without its spend mark.
//!
//! Every backend implements the same rules:
//!
//! - jobs are keyed by `(txid, vout)`, proofs by `(txid, vin)`, content by `txid`
//! - re-applying a record only refreshes its block attribution
//! - a mempool sighting never clears a confirmed attribution
//! - a job's spend fields are derived from the proofs table on every change,
//!   preferring the lowest confirmed proof, then the lowest unconfirmed one
//! - a confirmed proof evicts unconfirmed proofs (and jobs) of any other
//!   transaction that spent the same job output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStore;
use crate::detector::TxDetections;
use crate::error::IndexerError;
use crate::types::{
    BlockStamp, Content, ContentRecord, ContentView, Job, JobFilter, JobRecord, Proof, ProofRecord,
};

// ─── Write batch ──────────────────────────────────────────────────────────────

/// Everything one transaction contributes to the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxWrite {
    pub txid: String,
    /// `None` for mempool transactions.
    pub block: Option<BlockStamp>,
    /// Data carrier outputs of this transaction.
    pub contents: Vec<ContentRecord>,
    /// Content ids that must exist before the jobs below are visible.
    pub content_links: Vec<String>,
    pub jobs: Vec<JobRecord>,
    pub proofs: Vec<ProofRecord>,
}

impl TxWrite {
    /// Build the batch for a classified transaction.
    pub fn from_detections(detections: &TxDetections, block: Option<BlockStamp>) -> Self {
        let jobs: Vec<JobRecord> = detections.jobs().cloned().collect();
        let mut content_links: Vec<String> = Vec::new();
        for job in &jobs {
            if !content_links.contains(&job.content) {
                content_links.push(job.content.clone());
            }
        }
        Self {
            txid: detections.txid.clone(),
            block,
            contents: detections.contents().cloned().collect(),
            content_links,
            jobs,
            proofs: detections.proofs().cloned().collect(),
        }
    }

    /// A batch holding a single job and its content link.
    pub fn job(record: JobRecord, block: Option<BlockStamp>) -> Self {
        Self {
            txid: record.txid.clone(),
            block,
            content_links: vec![record.content.clone()],
            jobs: vec![record],
            ..Default::default()
        }
    }

    /// A batch holding a single proof.
    pub fn proof(record: ProofRecord, block: Option<BlockStamp>) -> Self {
        Self {
            txid: record.txid.clone(),
            block,
            proofs: vec![record],
            ..Default::default()
        }
    }

    /// A batch that only ensures a content row exists.
    pub fn link(content: impl Into<String>) -> Self {
        Self {
            content_links: vec![content.into()],
            ..Default::default()
        }
    }

    /// Returns `true` if applying this batch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
            && self.content_links.is_empty()
            && self.jobs.is_empty()
            && self.proofs.is_empty()
    }

    pub fn height(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.height)
    }
}

/// Row-level effects of one [`TxWrite`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub jobs_inserted: usize,
    /// Existing jobs whose block attribution was refreshed.
    pub jobs_updated: usize,
    pub proofs_inserted: usize,
    pub proofs_updated: usize,
    pub contents_created: usize,
    /// Proofs stored without their job being indexed yet.
    pub forward_refs: usize,
    /// Spend marks that changed (set, moved, or cleared).
    pub spends_changed: usize,
    /// Unconfirmed records evicted by a conflicting confirmed proof.
    pub double_spends_dropped: usize,
}

impl WriteOutcome {
    pub fn merge(&mut self, other: &WriteOutcome) {
        self.jobs_inserted += other.jobs_inserted;
        self.jobs_updated += other.jobs_updated;
        self.proofs_inserted += other.proofs_inserted;
        self.proofs_updated += other.proofs_updated;
        self.contents_created += other.contents_created;
        self.forward_refs += other.forward_refs;
        self.spends_changed += other.spends_changed;
        self.double_spends_dropped += other.double_spends_dropped;
    }
}

// ─── Invalidation ─────────────────────────────────────────────────────────────

/// What happens to a record whose block was orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Unconfirm records that were seen in the mempool (they may be mined
    /// again); remove the rest.
    #[default]
    RetainMempoolWitnessed,
    /// Remove every record in the range.
    RemoveAll,
}

impl InvalidationPolicy {
    /// Returns `true` if a record with this mempool witness survives as unconfirmed.
    pub fn retains(&self, mempool_seen: bool) -> bool {
        matches!(self, Self::RetainMempoolWitnessed) && mempool_seen
    }
}

/// Row-level effects of an invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub jobs_removed: usize,
    pub jobs_unconfirmed: usize,
    pub proofs_removed: usize,
    pub proofs_unconfirmed: usize,
    /// Content rows whose block attribution was cleared.
    pub contents_unconfirmed: usize,
    /// Jobs that lost their spend mark.
    pub spends_reversed: usize,
}

impl InvalidationReport {
    pub fn touched(&self) -> usize {
        self.jobs_removed
            + self.jobs_unconfirmed
            + self.proofs_removed
            + self.proofs_unconfirmed
            + self.contents_unconfirmed
    }
}

/// Pick the proof that a job's spend fields point at.
///
/// Confirmed proofs win over unconfirmed ones; among confirmed proofs the
/// lowest height wins; remaining ties go to the lowest `(txid, vin)`.
pub fn select_spender<'a>(candidates: impl IntoIterator<Item = &'a Proof>) -> Option<&'a Proof> {
    candidates.into_iter().min_by(|a, b| {
        let rank = |p: &Proof| (p.height().is_none(), p.height().unwrap_or(0));
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.record.txid.cmp(&b.record.txid))
            .then_with(|| a.record.vin.cmp(&b.record.vin))
    })
}

// ─── Store traits ─────────────────────────────────────────────────────────────

/// Row counts for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub jobs: u64,
    pub unconfirmed_jobs: u64,
    pub spent_jobs: u64,
    pub proofs: u64,
    /// Proofs whose job is not indexed.
    pub dangling_proofs: u64,
    pub contents: u64,
}

/// Read side of the index.
///
/// Reads may observe a proof whose job is not indexed yet; nothing else is
/// ever half-written.
#[async_trait]
pub trait IndexQuery: Send + Sync {
    async fn get_job(&self, txid: &str, vout: u32) -> Result<Option<Job>, IndexerError>;

    /// Jobs matching `filter`, ordered by `(txid, vout)`.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, IndexerError>;

    /// Number of jobs matching `filter` (ignores `limit`).
    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, IndexerError>;

    async fn get_proof(&self, txid: &str, vin: u32) -> Result<Option<Proof>, IndexerError>;

    /// Every proof that spends `job_txid:job_vout`, ordered by `(txid, vin)`.
    async fn proofs_for_job(&self, job_txid: &str, job_vout: u32) -> Result<Vec<Proof>, IndexerError>;

    async fn get_content(&self, txid: &str) -> Result<Option<Content>, IndexerError>;

    /// A content row with every job and proof that references it.
    async fn content_view(&self, txid: &str) -> Result<Option<ContentView>, IndexerError>;

    async fn stats(&self) -> Result<IndexStats, IndexerError>;
}

/// Full store: queries, checkpoints, and the atomic write path.
#[async_trait]
pub trait IndexStore: IndexQuery + CheckpointStore {
    /// Apply one transaction's records as a single atomic unit.
    async fn apply(&self, write: &TxWrite) -> Result<WriteOutcome, IndexerError>;

    /// Remove or unconfirm every job and proof attributed to a height in
    /// `from..=to`, clear content attributions in the range, and re-derive
    /// every spend mark that depended on an affected proof.
    async fn invalidate_range(
        &self,
        from: u64,
        to: u64,
        policy: InvalidationPolicy,
    ) -> Result<InvalidationReport, IndexerError>;

    /// Drop every job, proof, and content row (checkpoints are untouched).
    async fn clear(&self) -> Result<(), IndexerError>;
}
