//! SQLite storage backend for Boostindex.
//!
//! Persists jobs, proofs, content rows, and checkpoints to a single SQLite
//! file. Every [`TxWrite`] runs inside one SQL transaction. Uses `sqlx` with
//! WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use boostindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./boost.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use boostindex_core::checkpoint::{Checkpoint, CheckpointStore};
use boostindex_core::error::IndexerError;
use boostindex_core::store::{
    IndexQuery, IndexStats, IndexStore, InvalidationPolicy, InvalidationReport, TxWrite, WriteOutcome,
};
use boostindex_core::types::{
    BlockStamp, Content, ContentRecord, ContentView, Job, JobFilter, JobRecord, Proof, ProofRecord,
};

const JOB_COLUMNS: &str = "txid, vout, content, difficulty, target_bits, category, tag, \
    additional_data, user_nonce, value, script, miner_pubkey_hash, height, block_hash, \
    timestamp, mempool_seen, spent, spent_txid, spent_index";

const PROOF_COLUMNS: &str = "txid, vin, job_txid, job_vout, signature, pubkey, nonce, time, \
    extra_nonce_1, extra_nonce_2, miner_pubkey_hash, content, height, block_hash, timestamp, \
    mempool_seen";

/// SQLite-backed index storage.
pub struct SqliteStorage {
    pool: SqlitePool,
    /// SQLite has a single writer; queue batches here instead of hitting `SQLITE_BUSY`.
    write_lock: Mutex<()>,
}

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// Heights are stored as `INTEGER`; open-ended ranges use `u64::MAX`.
fn sql_height(height: u64) -> i64 {
    height.min(i64::MAX as u64) as i64
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./boost.db"`) or a full
    /// SQLite URL (`"sqlite:./boost.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;

        let storage = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        // WAL mode — better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                height       INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contents (
                txid         TEXT    PRIMARY KEY,
                on_chain     INTEGER NOT NULL,
                protocol     TEXT,
                height       INTEGER,
                block_hash   TEXT,
                timestamp    INTEGER
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                txid              TEXT    NOT NULL,
                vout              INTEGER NOT NULL,
                content           TEXT    NOT NULL,
                difficulty        REAL    NOT NULL,
                target_bits       INTEGER NOT NULL,
                category          INTEGER NOT NULL,
                tag               TEXT    NOT NULL,
                additional_data   TEXT    NOT NULL,
                user_nonce        INTEGER NOT NULL,
                value             INTEGER NOT NULL,
                script            TEXT    NOT NULL,
                miner_pubkey_hash TEXT,
                height            INTEGER,
                block_hash        TEXT,
                timestamp         INTEGER,
                mempool_seen      INTEGER NOT NULL,
                spent             INTEGER NOT NULL DEFAULT 0,
                spent_txid        TEXT,
                spent_index       INTEGER,
                PRIMARY KEY (txid, vout)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS proofs (
                txid              TEXT    NOT NULL,
                vin               INTEGER NOT NULL,
                job_txid          TEXT    NOT NULL,
                job_vout          INTEGER NOT NULL,
                signature         TEXT    NOT NULL,
                pubkey            TEXT    NOT NULL,
                nonce             INTEGER NOT NULL,
                time              INTEGER NOT NULL,
                extra_nonce_1     INTEGER NOT NULL,
                extra_nonce_2     TEXT    NOT NULL,
                miner_pubkey_hash TEXT,
                content           TEXT,
                height            INTEGER,
                block_hash        TEXT,
                timestamp         INTEGER,
                mempool_seen      INTEGER NOT NULL,
                PRIMARY KEY (txid, vin)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // Indexes for common query patterns
        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_jobs_content ON jobs (content);",
            "CREATE INDEX IF NOT EXISTS idx_jobs_height ON jobs (height);",
            "CREATE INDEX IF NOT EXISTS idx_proofs_job ON proofs (job_txid, job_vout);",
            "CREATE INDEX IF NOT EXISTS idx_proofs_content ON proofs (content);",
            "CREATE INDEX IF NOT EXISTS idx_proofs_height ON proofs (height);",
            "CREATE INDEX IF NOT EXISTS idx_contents_height ON contents (height);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn stamp_from_row(row: &SqliteRow) -> Option<BlockStamp> {
    let height: Option<i64> = row.get("height");
    height.map(|h| BlockStamp {
        height: h as u64,
        hash: row.get::<Option<String>, _>("block_hash").unwrap_or_default(),
        timestamp: row.get::<Option<i64>, _>("timestamp").unwrap_or_default(),
    })
}

fn job_from_row(row: &SqliteRow) -> Job {
    Job {
        record: JobRecord {
            txid: row.get("txid"),
            vout: row.get::<i64, _>("vout") as u32,
            content: row.get("content"),
            difficulty: row.get("difficulty"),
            target_bits: row.get::<i64, _>("target_bits") as u32,
            category: row.get::<i64, _>("category") as u32,
            tag: row.get("tag"),
            additional_data: row.get("additional_data"),
            user_nonce: row.get::<i64, _>("user_nonce") as u32,
            value: row.get::<i64, _>("value") as u64,
            script: row.get("script"),
            miner_pubkey_hash: row.get("miner_pubkey_hash"),
        },
        block: stamp_from_row(row),
        mempool_seen: row.get::<i64, _>("mempool_seen") != 0,
        spent: row.get::<i64, _>("spent") != 0,
        spent_txid: row.get("spent_txid"),
        spent_index: row.get::<Option<i64>, _>("spent_index").map(|i| i as u32),
    }
}

fn proof_from_row(row: &SqliteRow) -> Proof {
    Proof {
        record: ProofRecord {
            txid: row.get("txid"),
            vin: row.get::<i64, _>("vin") as u32,
            job_txid: row.get("job_txid"),
            job_vout: row.get::<i64, _>("job_vout") as u32,
            signature: row.get("signature"),
            pubkey: row.get("pubkey"),
            nonce: row.get::<i64, _>("nonce") as u32,
            time: row.get::<i64, _>("time") as u32,
            extra_nonce_1: row.get::<i64, _>("extra_nonce_1") as u32,
            extra_nonce_2: row.get("extra_nonce_2"),
            miner_pubkey_hash: row.get("miner_pubkey_hash"),
        },
        content: row.get("content"),
        block: stamp_from_row(row),
        mempool_seen: row.get::<i64, _>("mempool_seen") != 0,
    }
}

fn content_from_row(row: &SqliteRow) -> Content {
    Content {
        txid: row.get("txid"),
        on_chain: row.get::<i64, _>("on_chain") != 0,
        protocol: row.get("protocol"),
        block: stamp_from_row(row),
    }
}

// ─── Write rules ─────────────────────────────────────────────────────────────

async fn link_content(conn: &mut SqliteConnection, txid: &str) -> Result<bool, IndexerError> {
    let done = sqlx::query("INSERT OR IGNORE INTO contents (txid, on_chain) VALUES (?, 0)")
        .bind(txid)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(done.rows_affected() > 0)
}

async fn put_content(
    conn: &mut SqliteConnection,
    record: &ContentRecord,
    block: Option<&BlockStamp>,
) -> Result<bool, IndexerError> {
    let created = link_content(&mut *conn, &record.txid).await?;
    sqlx::query(
        "UPDATE contents SET
             on_chain   = 1,
             protocol   = COALESCE(protocol, ?),
             height     = COALESCE(?, height),
             block_hash = COALESCE(?, block_hash),
             timestamp  = COALESCE(?, timestamp)
         WHERE txid = ?",
    )
    .bind(record.protocol.as_deref())
    .bind(block.map(|b| b.height as i64))
    .bind(block.map(|b| b.hash.as_str()))
    .bind(block.map(|b| b.timestamp))
    .bind(&record.txid)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(created)
}

async fn put_job(
    conn: &mut SqliteConnection,
    record: &JobRecord,
    block: Option<&BlockStamp>,
    out: &mut WriteOutcome,
) -> Result<(), IndexerError> {
    let exists = sqlx::query("SELECT 1 FROM jobs WHERE txid = ? AND vout = ?")
        .bind(&record.txid)
        .bind(record.vout as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .is_some();

    if exists {
        let query = match block {
            Some(b) => sqlx::query(
                "UPDATE jobs SET height = ?, block_hash = ?, timestamp = ? WHERE txid = ? AND vout = ?",
            )
            .bind(b.height as i64)
            .bind(&b.hash)
            .bind(b.timestamp),
            None => sqlx::query("UPDATE jobs SET mempool_seen = 1 WHERE txid = ? AND vout = ?"),
        };
        query
            .bind(&record.txid)
            .bind(record.vout as i64)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        out.jobs_updated += 1;
    } else {
        sqlx::query(&format!(
            "INSERT INTO jobs ({JOB_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL)"
        ))
        .bind(&record.txid)
        .bind(record.vout as i64)
        .bind(&record.content)
        .bind(record.difficulty)
        .bind(record.target_bits as i64)
        .bind(record.category as i64)
        .bind(&record.tag)
        .bind(&record.additional_data)
        .bind(record.user_nonce as i64)
        .bind(record.value as i64)
        .bind(&record.script)
        .bind(record.miner_pubkey_hash.as_deref())
        .bind(block.map(|b| b.height as i64))
        .bind(block.map(|b| b.hash.as_str()))
        .bind(block.map(|b| b.timestamp))
        .bind(block.is_none())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
        out.jobs_inserted += 1;

        let resolved = sqlx::query(
            "UPDATE proofs SET content = ? WHERE job_txid = ? AND job_vout = ? AND content IS NULL",
        )
        .bind(&record.content)
        .bind(&record.txid)
        .bind(record.vout as i64)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?
        .rows_affected();
        if resolved > 0 {
            debug!(txid = %record.txid, vout = record.vout, proofs = resolved, "forward references resolved");
        }
    }

    if refresh_spend(&mut *conn, &record.txid, record.vout).await?.is_some() {
        out.spends_changed += 1;
    }
    Ok(())
}

async fn put_proof(
    conn: &mut SqliteConnection,
    record: &ProofRecord,
    block: Option<&BlockStamp>,
    out: &mut WriteOutcome,
) -> Result<(), IndexerError> {
    let content: Option<String> = sqlx::query("SELECT content FROM jobs WHERE txid = ? AND vout = ?")
        .bind(&record.job_txid)
        .bind(record.job_vout as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(|row| row.get("content"));

    let exists = sqlx::query("SELECT 1 FROM proofs WHERE txid = ? AND vin = ?")
        .bind(&record.txid)
        .bind(record.vin as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .is_some();

    if exists {
        sqlx::query(
            "UPDATE proofs SET
                 height       = COALESCE(?, height),
                 block_hash   = COALESCE(?, block_hash),
                 timestamp    = COALESCE(?, timestamp),
                 mempool_seen = MAX(mempool_seen, ?),
                 content      = COALESCE(content, ?)
             WHERE txid = ? AND vin = ?",
        )
        .bind(block.map(|b| b.height as i64))
        .bind(block.map(|b| b.hash.as_str()))
        .bind(block.map(|b| b.timestamp))
        .bind(block.is_none() as i64)
        .bind(content.as_deref())
        .bind(&record.txid)
        .bind(record.vin as i64)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
        out.proofs_updated += 1;
    } else {
        if content.is_none() {
            debug!(txid = %record.txid, vin = record.vin, job = %record.job_key(), "proof indexed before its job");
            out.forward_refs += 1;
        }
        sqlx::query(&format!(
            "INSERT INTO proofs ({PROOF_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.txid)
        .bind(record.vin as i64)
        .bind(&record.job_txid)
        .bind(record.job_vout as i64)
        .bind(&record.signature)
        .bind(&record.pubkey)
        .bind(record.nonce as i64)
        .bind(record.time as i64)
        .bind(record.extra_nonce_1 as i64)
        .bind(&record.extra_nonce_2)
        .bind(record.miner_pubkey_hash.as_deref())
        .bind(content.as_deref())
        .bind(block.map(|b| b.height as i64))
        .bind(block.map(|b| b.hash.as_str()))
        .bind(block.map(|b| b.timestamp))
        .bind(block.is_none())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
        out.proofs_inserted += 1;
    }

    if block.is_some() {
        let dropped = evict_conflicts(&mut *conn, record, out).await?;
        out.double_spends_dropped += dropped;
    }
    if refresh_spend(&mut *conn, &record.job_txid, record.job_vout).await?.is_some() {
        out.spends_changed += 1;
    }
    Ok(())
}

/// Drop unconfirmed records of every other transaction that spent the same
/// job output as the confirmed `record`.
async fn evict_conflicts(
    conn: &mut SqliteConnection,
    record: &ProofRecord,
    out: &mut WriteOutcome,
) -> Result<usize, IndexerError> {
    let rivals: Vec<String> = sqlx::query(
        "SELECT DISTINCT txid FROM proofs
         WHERE job_txid = ? AND job_vout = ? AND txid != ? AND height IS NULL
         ORDER BY txid",
    )
    .bind(&record.job_txid)
    .bind(record.job_vout as i64)
    .bind(&record.txid)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?
    .iter()
    .map(|row| row.get("txid"))
    .collect();

    let mut dropped = 0usize;
    for txid in rivals {
        let affected: Vec<(String, i64)> = sqlx::query(
            "SELECT DISTINCT job_txid, job_vout FROM proofs WHERE txid = ? AND height IS NULL",
        )
        .bind(&txid)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .iter()
        .map(|row| (row.get("job_txid"), row.get("job_vout")))
        .collect();

        let proofs = sqlx::query("DELETE FROM proofs WHERE txid = ? AND height IS NULL")
            .bind(&txid)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?
            .rows_affected();
        let jobs = sqlx::query("DELETE FROM jobs WHERE txid = ? AND height IS NULL")
            .bind(&txid)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?
            .rows_affected();

        let n = (proofs + jobs) as usize;
        tracing::warn!(
            winner = %record.txid,
            loser = %txid,
            job = %record.job_key(),
            records = n,
            "double spend: dropping unconfirmed records"
        );
        dropped += n;

        for (job_txid, job_vout) in affected {
            if refresh_spend(&mut *conn, &job_txid, job_vout as u32).await?.is_some() {
                out.spends_changed += 1;
            }
        }
    }
    Ok(dropped)
}

/// Re-derive a job's spend fields from the proofs table.
///
/// Returns the new spent flag if anything changed.
async fn refresh_spend(
    conn: &mut SqliteConnection,
    txid: &str,
    vout: u32,
) -> Result<Option<bool>, IndexerError> {
    let Some(row) = sqlx::query("SELECT spent_txid, spent_index FROM jobs WHERE txid = ? AND vout = ?")
        .bind(txid)
        .bind(vout as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
    else {
        return Ok(None);
    };
    let current: (Option<String>, Option<i64>) = (row.get("spent_txid"), row.get("spent_index"));

    // Same order as `select_spender`: confirmed first, then height, txid, vin.
    let next: (Option<String>, Option<i64>) = sqlx::query(
        "SELECT txid, vin FROM proofs
         WHERE job_txid = ? AND job_vout = ?
         ORDER BY height IS NULL, height, txid, vin
         LIMIT 1",
    )
    .bind(txid)
    .bind(vout as i64)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?
    .map_or((None, None), |r| (Some(r.get("txid")), Some(r.get("vin"))));

    if current == next {
        return Ok(None);
    }
    let spent = next.0.is_some();
    sqlx::query("UPDATE jobs SET spent = ?, spent_txid = ?, spent_index = ? WHERE txid = ? AND vout = ?")
        .bind(spent)
        .bind(next.0.as_deref())
        .bind(next.1)
        .bind(txid)
        .bind(vout as i64)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(Some(spent))
}

// ─── IndexQuery impl ─────────────────────────────────────────────────────────

#[async_trait]
impl IndexQuery for SqliteStorage {
    async fn get_job(&self, txid: &str, vout: u32) -> Result<Option<Job>, IndexerError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE txid = ? AND vout = ?"))
            .bind(txid)
            .bind(vout as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(job_from_row))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE (? IS NULL OR content = ?)
               AND (? IS NULL OR category = ?)
               AND (? IS NULL OR tag = ?)
               AND (? IS NULL OR spent = ?)
             ORDER BY txid, vout
             LIMIT ?"
        ))
        .bind(filter.content.as_deref())
        .bind(filter.content.as_deref())
        .bind(filter.category.map(i64::from))
        .bind(filter.category.map(i64::from))
        .bind(filter.tag.as_deref())
        .bind(filter.tag.as_deref())
        .bind(filter.spent)
        .bind(filter.spent)
        .bind(filter.limit.map_or(-1, |l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, IndexerError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM jobs
             WHERE (? IS NULL OR content = ?)
               AND (? IS NULL OR category = ?)
               AND (? IS NULL OR tag = ?)
               AND (? IS NULL OR spent = ?)",
        )
        .bind(filter.content.as_deref())
        .bind(filter.content.as_deref())
        .bind(filter.category.map(i64::from))
        .bind(filter.category.map(i64::from))
        .bind(filter.tag.as_deref())
        .bind(filter.tag.as_deref())
        .bind(filter.spent)
        .bind(filter.spent)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn get_proof(&self, txid: &str, vin: u32) -> Result<Option<Proof>, IndexerError> {
        let row = sqlx::query(&format!("SELECT {PROOF_COLUMNS} FROM proofs WHERE txid = ? AND vin = ?"))
            .bind(txid)
            .bind(vin as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(proof_from_row))
    }

    async fn proofs_for_job(&self, job_txid: &str, job_vout: u32) -> Result<Vec<Proof>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE job_txid = ? AND job_vout = ? ORDER BY txid, vin"
        ))
        .bind(job_txid)
        .bind(job_vout as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(proof_from_row).collect())
    }

    async fn get_content(&self, txid: &str) -> Result<Option<Content>, IndexerError> {
        let row = sqlx::query(
            "SELECT txid, on_chain, protocol, height, block_hash, timestamp FROM contents WHERE txid = ?",
        )
        .bind(txid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(content_from_row))
    }

    async fn content_view(&self, txid: &str) -> Result<Option<ContentView>, IndexerError> {
        // One read transaction so the three selects see the same snapshot.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some(content) = sqlx::query(
            "SELECT txid, on_chain, protocol, height, block_hash, timestamp FROM contents WHERE txid = ?",
        )
        .bind(txid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(content_from_row) else {
            return Ok(None);
        };

        let jobs = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE content = ? ORDER BY txid, vout"
        ))
        .bind(txid)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .map(job_from_row)
        .collect();

        let proofs = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE content = ? ORDER BY txid, vin"
        ))
        .bind(txid)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .map(proof_from_row)
        .collect();

        tx.commit().await.map_err(db_err)?;
        Ok(Some(ContentView { content, jobs, proofs }))
    }

    async fn stats(&self) -> Result<IndexStats, IndexerError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM jobs)                        AS jobs,
                (SELECT COUNT(*) FROM jobs WHERE height IS NULL)   AS unconfirmed_jobs,
                (SELECT COUNT(*) FROM jobs WHERE spent = 1)        AS spent_jobs,
                (SELECT COUNT(*) FROM proofs)                      AS proofs,
                (SELECT COUNT(*) FROM proofs p WHERE NOT EXISTS
                    (SELECT 1 FROM jobs j WHERE j.txid = p.job_txid AND j.vout = p.job_vout))
                                                                   AS dangling_proofs,
                (SELECT COUNT(*) FROM contents)                    AS contents",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(IndexStats {
            jobs: row.get::<i64, _>("jobs") as u64,
            unconfirmed_jobs: row.get::<i64, _>("unconfirmed_jobs") as u64,
            spent_jobs: row.get::<i64, _>("spent_jobs") as u64,
            proofs: row.get::<i64, _>("proofs") as u64,
            dangling_proofs: row.get::<i64, _>("dangling_proofs") as u64,
            contents: row.get::<i64, _>("contents") as u64,
        })
    }
}

// ─── IndexStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for SqliteStorage {
    async fn apply(&self, write: &TxWrite) -> Result<WriteOutcome, IndexerError> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let block = write.block.as_ref();
        let mut out = WriteOutcome::default();

        for record in &write.contents {
            if put_content(&mut tx, record, block).await? {
                out.contents_created += 1;
            }
        }
        for content in &write.content_links {
            if link_content(&mut tx, content).await? {
                out.contents_created += 1;
            }
        }
        for record in &write.jobs {
            put_job(&mut tx, record, block, &mut out).await?;
        }
        for record in &write.proofs {
            put_proof(&mut tx, record, block, &mut out).await?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!(txid = %write.txid, height = ?write.height(), ?out, "batch committed");
        Ok(out)
    }

    async fn invalidate_range(
        &self,
        from: u64,
        to: u64,
        policy: InvalidationPolicy,
    ) -> Result<InvalidationReport, IndexerError> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let (from, to) = (sql_height(from), sql_height(to));
        let mut report = InvalidationReport::default();

        let affected: Vec<(String, i64)> = sqlx::query(
            "SELECT DISTINCT job_txid, job_vout FROM proofs WHERE height BETWEEN ? AND ?",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .map(|row| (row.get("job_txid"), row.get("job_vout")))
        .collect();

        if policy == InvalidationPolicy::RetainMempoolWitnessed {
            report.jobs_unconfirmed = sqlx::query(
                "UPDATE jobs SET height = NULL, block_hash = NULL, timestamp = NULL
                 WHERE height BETWEEN ? AND ? AND mempool_seen = 1",
            )
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected() as usize;

            report.proofs_unconfirmed = sqlx::query(
                "UPDATE proofs SET height = NULL, block_hash = NULL, timestamp = NULL
                 WHERE height BETWEEN ? AND ? AND mempool_seen = 1",
            )
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected() as usize;
        }

        report.jobs_removed = sqlx::query("DELETE FROM jobs WHERE height BETWEEN ? AND ?")
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected() as usize;

        report.proofs_removed = sqlx::query("DELETE FROM proofs WHERE height BETWEEN ? AND ?")
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected() as usize;

        report.contents_unconfirmed = sqlx::query(
            "UPDATE contents SET height = NULL, block_hash = NULL, timestamp = NULL
             WHERE height BETWEEN ? AND ?",
        )
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected() as usize;

        for (job_txid, job_vout) in affected {
            if refresh_spend(&mut tx, &job_txid, job_vout as u32).await? == Some(false) {
                report.spends_reversed += 1;
            }
        }

        tx.commit().await.map_err(db_err)?;
        debug!(from, to, ?report, "range invalidated");
        Ok(report)
    }

    async fn clear(&self) -> Result<(), IndexerError> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for table in ["jobs", "proofs", "contents"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, height, block_hash, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            indexer_id: r.get("indexer_id"),
            height: r.get::<i64, _>("height") as u64,
            block_hash: r.get("block_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (chain_id, indexer_id, height, block_hash, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.chain_id)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.height as i64)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(
            chain_id = %checkpoint.chain_id,
            indexer_id = %checkpoint.indexer_id,
            height = checkpoint.height,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?")
            .bind(chain_id)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
