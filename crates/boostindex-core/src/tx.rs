//! Raw transaction decoding.
//!
//! BSV keeps the legacy Bitcoin serialisation, so `bitcoin`'s consensus codec
//! reads it directly. Txids are displayed byte-reversed, as nodes print them.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Txid, Witness};

pub use bitcoin::{ScriptBuf, Transaction, TxIn, TxOut};

use crate::error::IndexerError;
use crate::types::RawTransaction;

/// Decode a transaction from its raw serialisation. Trailing bytes are rejected.
pub fn decode(raw: &[u8]) -> Result<Transaction, IndexerError> {
    consensus::deserialize(raw).map_err(|e| IndexerError::Decode(e.to_string()))
}

/// Decode a hex-encoded transaction.
pub fn decode_hex(raw_hex: &str) -> Result<Transaction, IndexerError> {
    let raw = hex::decode(raw_hex.trim()).map_err(|e| IndexerError::Decode(e.to_string()))?;
    decode(&raw)
}

/// Display-order txid of `tx`.
pub fn txid_hex(tx: &Transaction) -> String {
    tx.compute_txid().to_string()
}

/// An input spending `prev_txid:prev_vout` with `script_sig`.
pub fn spend(prev_txid: &str, prev_vout: u32, script_sig: ScriptBuf) -> Result<TxIn, IndexerError> {
    let txid = Txid::from_str(prev_txid).map_err(|e| IndexerError::Decode(format!("{prev_txid}: {e}")))?;
    Ok(TxIn {
        previous_output: OutPoint::new(txid, prev_vout),
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    })
}

/// An output paying `value` satoshis to `script_pubkey`.
pub fn output(value: u64, script_pubkey: ScriptBuf) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey,
    }
}

/// A version-1 transaction with no lock time.
pub fn assemble(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    }
}

impl From<&Transaction> for RawTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            txid: txid_hex(tx),
            raw: consensus::serialize(tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        assemble(
            vec![spend(&"11".repeat(32), 3, ScriptBuf::from_bytes(vec![0x51])).unwrap()],
            vec![
                output(5_000, ScriptBuf::from_bytes(vec![0x76, 0xa9])),
                output(0, ScriptBuf::from_bytes(vec![0x00, 0x6a])),
            ],
        )
    }

    #[test]
    fn feed_form_decodes() {
        let tx = sample();
        let raw = RawTransaction::from(&tx);
        let decoded = decode(&raw.raw).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(txid_hex(&decoded), raw.txid);
        assert_eq!(decoded.input[0].previous_output.txid.to_string(), "11".repeat(32));
        assert_eq!(decoded.output[0].value.to_sat(), 5_000);
    }

    #[test]
    fn genesis_coinbase_txid() {
        let raw = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";
        let tx = decode_hex(raw).unwrap();
        assert_eq!(
            txid_hex(&tx),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
        assert_eq!(tx.output[0].value.to_sat(), 5_000_000_000);
    }

    #[test]
    fn rejects_truncated_and_trailing_bytes() {
        let raw = RawTransaction::from(&sample()).raw;
        assert!(decode(&raw[..raw.len() - 1]).is_err());
        assert!(decode(&[]).is_err());
        // version, then a count claiming 0xffffffff inputs
        assert!(decode(&[1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 0xff]).is_err());

        let mut padded = raw.clone();
        padded.push(0);
        assert!(decode(&padded).is_err());
    }

    #[test]
    fn rejects_bad_prev_txid() {
        assert!(spend("not-hex", 0, ScriptBuf::new()).is_err());
    }
}
