//! Error types for the boostindex pipeline.

use thiserror::Error;

/// Errors that can occur during ingestion and indexing.
///
/// Malformed scripts and proofs that arrive before their job are not errors;
/// the detector classifies the former as `None` and the store parks the latter
/// as forward references.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Invalid block at height {height}: {reason}")]
    InvalidBlock { height: u64, reason: String },

    #[error("Reorg detected at height {height}: expected parent {expected}, got {actual}")]
    ReorgDetected {
        height: u64,
        expected: String,
        actual: String,
    },

    #[error("Ingestion stalled at height {height} after {attempts} attempts: {reason}")]
    IngestionStalled {
        height: u64,
        attempts: u32,
        reason: String,
    },

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error is a reorg (recoverable).
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::ReorgDetected { .. })
    }

    /// Returns `true` if retrying the same operation may succeed.
    ///
    /// Every store write is idempotent, so storage failures are always retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Feed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(IndexerError::Storage("locked".into()).is_retryable());
        assert!(!IndexerError::Decode("short".into()).is_retryable());
        let reorg = IndexerError::ReorgDetected {
            height: 10,
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(reorg.is_reorg());
        assert!(!reorg.is_retryable());
    }
}
