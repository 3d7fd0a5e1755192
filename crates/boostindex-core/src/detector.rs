//! Pattern detector — classifies every output and input of a transaction.
//!
//! Detection is pure: the same transaction bytes always yield the same
//! detections, whatever was detected before. Unparseable scripts classify as
//! [`DetectedRecord::None`]; undecodable transactions yield no detections.

use serde::{Deserialize, Serialize};

use crate::pattern;
use crate::tx::{self, Transaction};
use crate::types::{ContentRecord, JobRecord, ProofRecord};

/// Where in the transaction a detection was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Output(u32),
    Input(u32),
}

/// The closed set of things a single output/input can be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectedRecord {
    Job(JobRecord),
    Proof(ProofRecord),
    Content(ContentRecord),
    None,
}

/// One classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub position: Position,
    pub record: DetectedRecord,
}

/// All detections for a transaction, outputs first then inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxDetections {
    pub txid: String,
    pub detections: Vec<Detection>,
}

impl TxDetections {
    pub fn jobs(&self) -> impl Iterator<Item = &JobRecord> {
        self.detections.iter().filter_map(|d| match &d.record {
            DetectedRecord::Job(j) => Some(j),
            _ => None,
        })
    }

    pub fn proofs(&self) -> impl Iterator<Item = &ProofRecord> {
        self.detections.iter().filter_map(|d| match &d.record {
            DetectedRecord::Proof(p) => Some(p),
            _ => None,
        })
    }

    pub fn contents(&self) -> impl Iterator<Item = &ContentRecord> {
        self.detections.iter().filter_map(|d| match &d.record {
            DetectedRecord::Content(c) => Some(c),
            _ => None,
        })
    }

    /// Returns `true` if nothing Boost-related or content-bearing was found.
    pub fn is_empty(&self) -> bool {
        self.detections
            .iter()
            .all(|d| matches!(d.record, DetectedRecord::None))
    }
}

/// Stateless Boost pattern detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// Decode `raw` and classify it. Undecodable bytes yield an empty result.
    pub fn detect_raw(&self, txid_hint: &str, raw: &[u8]) -> TxDetections {
        match tx::decode(raw) {
            Ok(tx) => {
                let found = self.detect(&tx);
                if !txid_hint.is_empty() && !found.txid.eq_ignore_ascii_case(txid_hint) {
                    tracing::debug!(
                        hint = txid_hint,
                        computed = %found.txid,
                        "feed txid differs from computed txid; using computed"
                    );
                }
                found
            }
            Err(e) => {
                tracing::debug!(txid = txid_hint, error = %e, "undecodable transaction");
                TxDetections {
                    txid: txid_hint.to_string(),
                    detections: vec![],
                }
            }
        }
    }

    /// Classify every output, then every input, of `tx`.
    pub fn detect(&self, tx: &Transaction) -> TxDetections {
        let txid = tx::txid_hex(tx);
        let mut detections = Vec::with_capacity(tx.output.len() + tx.input.len());

        for (vout, output) in tx.output.iter().enumerate() {
            let vout = vout as u32;
            let record = if let Some(job) = pattern::match_job(&output.script_pubkey) {
                match job.difficulty() {
                    Some(difficulty) => DetectedRecord::Job(JobRecord {
                        txid: txid.clone(),
                        vout,
                        content: job.content_hex(),
                        difficulty,
                        target_bits: job.target_bits,
                        category: job.category,
                        tag: hex::encode(&job.tag),
                        additional_data: hex::encode(&job.additional_data),
                        user_nonce: job.user_nonce,
                        value: output.value.to_sat(),
                        script: hex::encode(output.script_pubkey.as_bytes()),
                        miner_pubkey_hash: job.miner_pubkey_hash.as_ref().map(hex::encode),
                    }),
                    None => DetectedRecord::None,
                }
            } else if let Some(protocol) = pattern::match_data_carrier(&output.script_pubkey) {
                DetectedRecord::Content(ContentRecord {
                    txid: txid.clone(),
                    vout,
                    protocol,
                })
            } else {
                DetectedRecord::None
            };
            detections.push(Detection {
                position: Position::Output(vout),
                record,
            });
        }

        for (vin, input) in tx.input.iter().enumerate() {
            let vin = vin as u32;
            let record = match pattern::match_proof(&input.script_sig) {
                Some(proof) => DetectedRecord::Proof(ProofRecord {
                    txid: txid.clone(),
                    vin,
                    job_txid: input.previous_output.txid.to_string(),
                    job_vout: input.previous_output.vout,
                    signature: hex::encode(&proof.signature),
                    pubkey: hex::encode(&proof.pubkey),
                    nonce: proof.nonce,
                    time: proof.time,
                    extra_nonce_1: proof.extra_nonce_1,
                    extra_nonce_2: hex::encode(&proof.extra_nonce_2),
                    miner_pubkey_hash: proof.miner_pubkey_hash.as_ref().map(hex::encode),
                }),
                None => DetectedRecord::None,
            };
            detections.push(Detection {
                position: Position::Input(vin),
                record,
            });
        }

        TxDetections { txid, detections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{encode_job_script, encode_proof_script, JobScript, ProofScript};
    use crate::types::RawTransaction;
    use bitcoin::ScriptBuf;

    fn job_script(content: u8) -> ScriptBuf {
        encode_job_script(&JobScript {
            miner_pubkey_hash: None,
            category: 0,
            content: [content; 32],
            target_bits: 0x1c0ffff0,
            tag: vec![],
            user_nonce: 1,
            additional_data: b"extra".to_vec(),
        })
        .unwrap()
    }

    fn proof_sig() -> ScriptBuf {
        let mut pubkey = vec![0x03];
        pubkey.extend_from_slice(&[0x44; 32]);
        encode_proof_script(&ProofScript {
            signature: vec![0x30; 70],
            pubkey,
            nonce: 1,
            time: 2,
            extra_nonce_2: vec![0xee; 8],
            extra_nonce_1: 3,
            miner_pubkey_hash: Some(vec![0x55; 20]),
        })
        .unwrap()
    }

    fn mixed_tx() -> Transaction {
        tx::assemble(
            vec![tx::spend(&"aa".repeat(32), 2, proof_sig()).unwrap()],
            vec![
                tx::output(10_000, job_script(0xcd)),
                tx::output(0, ScriptBuf::from_bytes(vec![0x00, 0x6a, 0x03, b'a', b'b', b'c'])),
                tx::output(546, ScriptBuf::from_bytes(vec![0x76, 0xa9, 0x00, 0x88, 0xac])),
            ],
        )
    }

    #[test]
    fn classifies_each_position() {
        let tx = mixed_tx();
        let found = PatternDetector::new().detect(&tx);

        assert_eq!(found.txid, tx::txid_hex(&tx));
        assert_eq!(found.detections.len(), 4);
        assert_eq!(found.detections[0].position, Position::Output(0));
        assert_eq!(found.detections[3].position, Position::Input(0));

        let job = found.jobs().next().unwrap();
        assert_eq!(job.vout, 0);
        assert_eq!(job.value, 10_000);
        assert_eq!(job.difficulty, 16.0);
        assert_eq!(job.content, "cd".repeat(32));
        assert_eq!(job.additional_data, hex::encode(b"extra"));

        let content = found.contents().next().unwrap();
        assert_eq!(content.vout, 1);
        assert_eq!(content.protocol.as_deref(), Some("abc"));

        assert!(matches!(found.detections[2].record, DetectedRecord::None));

        let proof = found.proofs().next().unwrap();
        assert_eq!(proof.job_txid, "aa".repeat(32));
        assert_eq!(proof.job_vout, 2);
        assert_eq!(proof.miner_pubkey_hash, Some("55".repeat(20)));
    }

    #[test]
    fn detection_is_repeatable() {
        let tx = mixed_tx();
        let det = PatternDetector::new();
        let raw = RawTransaction::from(&tx);
        let first = det.detect_raw(&raw.txid, &raw.raw);
        let _unrelated = det.detect_raw("", &[0xde, 0xad]);
        let second = det.detect_raw(&raw.txid, &raw.raw);
        assert_eq!(first, second);
        assert_eq!(first, det.detect(&tx));
    }

    #[test]
    fn undecodable_bytes_yield_nothing() {
        let found = PatternDetector::new().detect_raw("feedface", &[1, 2, 3]);
        assert_eq!(found.txid, "feedface");
        assert!(found.detections.is_empty());
        assert!(found.is_empty());
    }

    #[test]
    fn malformed_scripts_are_none() {
        let tx = tx::assemble(
            vec![tx::spend(&"bb".repeat(32), 0, ScriptBuf::from_bytes(vec![0x4e, 0x01])).unwrap()],
            vec![tx::output(1, ScriptBuf::from_bytes(vec![0x08, b'b', b'o', b'o', b's', b't']))],
        );
        let found = PatternDetector::new().detect(&tx);
        assert_eq!(found.detections.len(), 2);
        assert!(found.is_empty());
    }
}
