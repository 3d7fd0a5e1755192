//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// A block's position in the chain — enough for the coordinator to track lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
}

impl BlockRef {
    pub fn new(height: u64, hash: impl Into<String>, parent_hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
        }
    }

    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockRef) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

/// A transaction as delivered by the chain feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    pub raw: Vec<u8>,
}

/// A full block as delivered by the chain feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockRef,
    /// Unix timestamp of the block header.
    pub timestamp: i64,
    pub transactions: Vec<RawTransaction>,
}

impl Block {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Block attribution stamped onto every record this block confirms.
    pub fn stamp(&self) -> BlockStamp {
        BlockStamp {
            height: self.header.height,
            hash: self.header.hash.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Block attribution of a record. `None` on a record means "mempool, unconfirmed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStamp {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
}

// ─── Detected records ─────────────────────────────────────────────────────────

/// Identity of a job or proof: `(txid, index)`.
///
/// For jobs the index is the output index; for proofs it is the input index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub txid: String,
    pub index: u32,
}

impl RecordKey {
    pub fn new(txid: impl Into<String>, index: u32) -> Self {
        Self {
            txid: txid.into(),
            index,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// Detection-derived fields of a Boost job output. Immutable once first observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub txid: String,
    pub vout: u32,
    /// Target content (txid, display hex).
    pub content: String,
    pub difficulty: f64,
    /// Compact target bits as committed in the script.
    pub target_bits: u32,
    pub category: u32,
    /// Hex-encoded tag bytes.
    pub tag: String,
    /// Hex-encoded additional data.
    pub additional_data: String,
    pub user_nonce: u32,
    /// Satoshis locked in the job output.
    pub value: u64,
    /// Hex-encoded locking script.
    pub script: String,
    /// Present for contract jobs that name a miner.
    pub miner_pubkey_hash: Option<String>,
}

impl JobRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.txid, self.vout)
    }
}

/// Detection-derived fields of a Boost proof input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub txid: String,
    pub vin: u32,
    /// The job output this proof spends.
    pub job_txid: String,
    pub job_vout: u32,
    pub signature: String,
    pub pubkey: String,
    pub nonce: u32,
    pub time: u32,
    pub extra_nonce_1: u32,
    pub extra_nonce_2: String,
    pub miner_pubkey_hash: Option<String>,
}

impl ProofRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.txid, self.vin)
    }

    pub fn job_key(&self) -> RecordKey {
        RecordKey::new(&self.job_txid, self.job_vout)
    }
}

/// An on-chain data carrier output. The carrying transaction is the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub txid: String,
    pub vout: u32,
    /// First pushed element, if it is printable (e.g. a protocol prefix).
    pub protocol: Option<String>,
}

// ─── Persisted entities ───────────────────────────────────────────────────────

/// An indexed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub record: JobRecord,
    pub block: Option<BlockStamp>,
    /// The job was observed in the mempool at least once.
    pub mempool_seen: bool,
    pub spent: bool,
    pub spent_txid: Option<String>,
    /// Input index of the spending proof.
    pub spent_index: Option<u32>,
}

impl Job {
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    pub fn height(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.height)
    }
}

/// An indexed proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub record: ProofRecord,
    /// Content of the spent job; `None` while the job is not yet indexed.
    pub content: Option<String>,
    pub block: Option<BlockStamp>,
    pub mempool_seen: bool,
}

impl Proof {
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    pub fn height(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.height)
    }
}

/// An indexed content row. Created lazily by the first job that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub txid: String,
    /// Set once the content transaction itself has been detected.
    pub on_chain: bool,
    pub protocol: Option<String>,
    pub block: Option<BlockStamp>,
}

impl Content {
    /// A reference-only row for content known only through a job.
    pub fn reference(txid: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            on_chain: false,
            protocol: None,
            block: None,
        }
    }
}

// ─── Queries ──────────────────────────────────────────────────────────────────

/// Filter for job listings. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub content: Option<String>,
    pub category: Option<u32>,
    pub tag: Option<String>,
    pub spent: Option<bool>,
    /// Maximum rows returned; `None` = unbounded.
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn spent(mut self, spent: bool) -> Self {
        self.spent = Some(spent);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `job` passes every set criterion (ignores `limit`).
    pub fn matches(&self, job: &Job) -> bool {
        self.content.as_ref().map_or(true, |c| c == &job.record.content)
            && self.category.map_or(true, |c| c == job.record.category)
            && self.tag.as_ref().map_or(true, |t| t == &job.record.tag)
            && self.spent.map_or(true, |s| s == job.spent)
    }
}

/// A content row together with every job and proof that references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub content: Content,
    pub jobs: Vec<Job>,
    pub proofs: Vec<Proof>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn job(txid: &str, content: &str, category: u32) -> Job {
        Job {
            record: JobRecord {
                txid: txid.into(),
                vout: 0,
                content: content.into(),
                difficulty: 1.0,
                target_bits: 0x1d00ffff,
                category,
                tag: "01".into(),
                additional_data: String::new(),
                user_nonce: 0,
                value: 1_000,
                script: String::new(),
                miner_pubkey_hash: None,
            },
            block: None,
            mempool_seen: true,
            spent: false,
            spent_txid: None,
            spent_index: None,
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = BlockRef::new(100, "aa", "00");
        let child = BlockRef::new(101, "bb", "aa");
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
        assert!(!BlockRef::new(102, "cc", "aa").extends(&parent));
    }

    #[test]
    fn job_filter_matches() {
        let j = job("t1", "c1", 7);
        assert!(JobFilter::default().matches(&j));
        assert!(JobFilter::content("c1").matches(&j));
        assert!(!JobFilter::content("c2").matches(&j));
        assert!(JobFilter::content("c1").spent(false).matches(&j));
        assert!(!JobFilter::default().spent(true).matches(&j));
        let by_cat = JobFilter {
            category: Some(8),
            ..Default::default()
        };
        assert!(!by_cat.matches(&j));
    }

    #[test]
    fn record_key_display() {
        assert_eq!(RecordKey::new("ab", 3).to_string(), "ab:3");
    }
}
