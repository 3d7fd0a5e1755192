//! Boost PoW script patterns.
//!
//! Job locking script:
//!
//! ```text
//! "boostpow" OP_DROP [minerPubKeyHash:20] category:4 content:32 target:4
//!     tag userNonce:4 additionalData OP_CAT <validation tail…>
//! ```
//!
//! Proof unlocking script:
//!
//! ```text
//! sig pubkey nonce:4 time:4 extraNonce2 extraNonce1:4 [minerPubKeyHash:20]
//! ```
//!
//! Matchers return `None` for anything that does not fit; they never fail.

use bitcoin::opcodes::all::{OP_CAT, OP_DROP, OP_DUP, OP_PUSHNUM_5, OP_RETURN, OP_ROLL, OP_SWAP, OP_TOALTSTACK};
use bitcoin::opcodes::OP_FALSE;
use bitcoin::pow::{CompactTarget, Target};
use bitcoin::script::{Builder, Instruction, PushBytes, PushBytesError, Script, ScriptBuf};

/// Magic prefix pushed at the start of every job script.
pub const BOOST_MAGIC: &[u8] = b"boostpow";

/// Fields committed in a job script.
#[derive(Debug, Clone, PartialEq)]
pub struct JobScript {
    pub miner_pubkey_hash: Option<Vec<u8>>,
    pub category: u32,
    /// Content id in display order (byte-reversed script bytes).
    pub content: [u8; 32],
    pub target_bits: u32,
    pub tag: Vec<u8>,
    pub user_nonce: u32,
    pub additional_data: Vec<u8>,
}

impl JobScript {
    /// Difficulty implied by the compact target.
    pub fn difficulty(&self) -> Option<f64> {
        difficulty_from_bits(self.target_bits)
    }

    pub fn content_hex(&self) -> String {
        hex::encode(self.content)
    }
}

/// Fields of a proof unlocking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofScript {
    pub signature: Vec<u8>,
    pub pubkey: Vec<u8>,
    pub nonce: u32,
    pub time: u32,
    pub extra_nonce_2: Vec<u8>,
    pub extra_nonce_1: u32,
    pub miner_pubkey_hash: Option<Vec<u8>>,
}

/// Difficulty for compact `bits`, relative to `0x1d00ffff` (difficulty 1).
///
/// Returns `None` for a zero or negative mantissa, or a target wider than 256 bits.
pub fn difficulty_from_bits(bits: u32) -> Option<f64> {
    let exponent = bits >> 24;
    if bits & 0x007f_ffff == 0 || bits & 0x0080_0000 != 0 || exponent > 0x20 {
        return None;
    }
    let target = Target::from_compact(CompactTarget::from_consensus(bits));
    (target != Target::ZERO).then(|| target.difficulty_float())
}

fn instructions(script: &Script) -> Option<Vec<Instruction<'_>>> {
    script.instructions().collect::<Result<_, _>>().ok()
}

fn data(ins: Instruction<'_>) -> Option<&[u8]> {
    match ins {
        Instruction::PushBytes(bytes) => Some(bytes.as_bytes()),
        Instruction::Op(_) => None,
    }
}

fn data_of_len(ins: Instruction<'_>, len: usize) -> Option<&[u8]> {
    data(ins).filter(|d| d.len() == len)
}

fn u32_le(bytes: &[u8]) -> Option<u32> {
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(arr))
}

/// Match a Boost job locking script.
pub fn match_job(script_pubkey: &Script) -> Option<JobScript> {
    let ins = instructions(script_pubkey)?;
    let mut it = ins.into_iter().peekable();

    if data(it.next()?)? != BOOST_MAGIC || it.next()? != Instruction::Op(OP_DROP) {
        return None;
    }

    // Contract jobs name a miner before the 4-byte category.
    let miner_pubkey_hash = it.peek().and_then(|i| data_of_len(*i, 20)).map(<[u8]>::to_vec);
    if miner_pubkey_hash.is_some() {
        it.next();
    }

    let category = u32_le(data_of_len(it.next()?, 4)?)?;

    let mut content: [u8; 32] = data_of_len(it.next()?, 32)?.try_into().ok()?;
    content.reverse();

    let target_bits = u32_le(data_of_len(it.next()?, 4)?)?;
    difficulty_from_bits(target_bits)?;

    let tag = data(it.next()?)?.to_vec();
    let user_nonce = u32_le(data_of_len(it.next()?, 4)?)?;
    let additional_data = data(it.next()?)?.to_vec();

    if it.next()? != Instruction::Op(OP_CAT) {
        return None;
    }

    Some(JobScript {
        miner_pubkey_hash,
        category,
        content,
        target_bits,
        tag,
        user_nonce,
        additional_data,
    })
}

/// Match a Boost proof unlocking script.
pub fn match_proof(script_sig: &Script) -> Option<ProofScript> {
    let ins = instructions(script_sig)?;
    if !(6..=7).contains(&ins.len()) {
        return None;
    }
    let pushes: Vec<&[u8]> = ins.into_iter().map(data).collect::<Option<_>>()?;

    let signature = pushes[0];
    let pubkey = pushes[1];
    if !(9..=73).contains(&signature.len()) {
        return None;
    }
    let pubkey_ok = matches!(
        (pubkey.len(), pubkey.first().copied()),
        (33, Some(0x02 | 0x03)) | (65, Some(0x04))
    );
    if !pubkey_ok {
        return None;
    }

    let nonce = u32_le(pushes[2])?;
    let time = u32_le(pushes[3])?;
    let extra_nonce_2 = pushes[4];
    if !(1..=32).contains(&extra_nonce_2.len()) {
        return None;
    }
    let extra_nonce_1 = u32_le(pushes[5])?;

    let miner_pubkey_hash = match pushes.get(6) {
        Some(pkh) if pkh.len() == 20 => Some(pkh.to_vec()),
        Some(_) => return None,
        None => None,
    };

    Some(ProofScript {
        signature: signature.to_vec(),
        pubkey: pubkey.to_vec(),
        nonce,
        time,
        extra_nonce_2: extra_nonce_2.to_vec(),
        extra_nonce_1,
        miner_pubkey_hash,
    })
}

/// Match an `OP_FALSE OP_RETURN` (or bare `OP_RETURN`) data carrier.
///
/// Returns the first pushed element as a protocol prefix when it is printable ASCII.
pub fn match_data_carrier(script_pubkey: &Script) -> Option<Option<String>> {
    let bytes = script_pubkey.as_bytes();
    let payload = match bytes {
        [first, second, rest @ ..] if *first == OP_FALSE.to_u8() && *second == OP_RETURN.to_u8() => rest,
        [_, rest @ ..] if script_pubkey.is_op_return() => rest,
        _ => return None,
    };

    let protocol = Script::from_bytes(payload)
        .instructions()
        .next()
        .and_then(Result::ok)
        .and_then(data)
        .filter(|p| !p.is_empty() && p.iter().all(|b| b.is_ascii_graphic()))
        .and_then(|p| String::from_utf8(p.to_vec()).ok());

    Some(protocol)
}

// ─── Encoders ─────────────────────────────────────────────────────────────────

fn push(builder: Builder, data: &[u8]) -> Result<Builder, PushBytesError> {
    Ok(builder.push_slice(<&PushBytes>::try_from(data)?))
}

/// Encode a job locking script (inverse of [`match_job`]).
pub fn encode_job_script(job: &JobScript) -> Result<ScriptBuf, PushBytesError> {
    let mut b = push(Builder::new(), BOOST_MAGIC)?.push_opcode(OP_DROP);
    if let Some(pkh) = &job.miner_pubkey_hash {
        b = push(b, pkh)?;
    }
    let mut content = job.content;
    content.reverse();
    b = push(b, &job.category.to_le_bytes())?;
    b = push(b, &content)?;
    b = push(b, &job.target_bits.to_le_bytes())?;
    b = push(b, &job.tag)?;
    b = push(b, &job.user_nonce.to_le_bytes())?;
    b = push(b, &job.additional_data)?;
    Ok(b.push_opcode(OP_CAT)
        .push_opcode(OP_SWAP)
        .push_opcode(OP_PUSHNUM_5)
        .push_opcode(OP_ROLL)
        .push_opcode(OP_DUP)
        .push_opcode(OP_TOALTSTACK)
        .push_opcode(OP_CAT)
        .into_script())
}

/// Encode a proof unlocking script (inverse of [`match_proof`]).
pub fn encode_proof_script(proof: &ProofScript) -> Result<ScriptBuf, PushBytesError> {
    let mut b = push(Builder::new(), &proof.signature)?;
    b = push(b, &proof.pubkey)?;
    b = push(b, &proof.nonce.to_le_bytes())?;
    b = push(b, &proof.time.to_le_bytes())?;
    b = push(b, &proof.extra_nonce_2)?;
    b = push(b, &proof.extra_nonce_1.to_le_bytes())?;
    if let Some(pkh) = &proof.miner_pubkey_hash {
        b = push(b, pkh)?;
    }
    Ok(b.into_script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::{OP_CHECKSIG, OP_EQUALVERIFY, OP_HASH160};

    fn job() -> JobScript {
        JobScript {
            miner_pubkey_hash: None,
            category: 0x01,
            content: [0xab; 32],
            target_bits: 0x1d00ffff,
            tag: b"news".to_vec(),
            user_nonce: 42,
            additional_data: vec![],
        }
    }

    fn proof() -> ProofScript {
        ProofScript {
            signature: vec![0x30; 71],
            pubkey: {
                let mut pk = vec![0x02];
                pk.extend_from_slice(&[0x11; 32]);
                pk
            },
            nonce: 7,
            time: 1_600_000_000,
            extra_nonce_2: vec![0; 8],
            extra_nonce_1: 9,
            miner_pubkey_hash: Some(vec![0x22; 20]),
        }
    }

    fn script(bytes: &[u8]) -> &Script {
        Script::from_bytes(bytes)
    }

    #[test]
    fn difficulty_one_and_sixteen() {
        assert_eq!(difficulty_from_bits(0x1d00ffff), Some(1.0));
        assert_eq!(difficulty_from_bits(0x1c0ffff0), Some(16.0));
        assert_eq!(difficulty_from_bits(0x1d000000), None);
        assert_eq!(difficulty_from_bits(0x1d800001), None);
        assert_eq!(difficulty_from_bits(0x2100ffff), None);
    }

    #[test]
    fn matches_bounty_job() {
        let script = encode_job_script(&job()).unwrap();
        let parsed = match_job(&script).unwrap();
        assert_eq!(parsed, job());
        assert_eq!(parsed.content_hex(), "ab".repeat(32));
        assert_eq!(parsed.difficulty(), Some(1.0));
    }

    #[test]
    fn matches_contract_job() {
        let mut contract = job();
        contract.miner_pubkey_hash = Some(vec![0x33; 20]);
        let parsed = match_job(&encode_job_script(&contract).unwrap()).unwrap();
        assert_eq!(parsed.miner_pubkey_hash, Some(vec![0x33; 20]));
        assert_eq!(parsed.category, 1);
    }

    #[test]
    fn content_is_displayed_reversed() {
        let mut j = job();
        j.content = [0u8; 32];
        j.content[0] = 0xff;
        let script = encode_job_script(&j).unwrap();
        // The script carries the little-endian form: 0xff ends up last.
        let ins = instructions(&script).unwrap();
        assert_eq!(data(ins[3]).unwrap()[31], 0xff);
        assert_eq!(match_job(&script).unwrap().content[0], 0xff);
    }

    #[test]
    fn rejects_non_boost_scripts() {
        // P2PKH
        let p2pkh = push(Builder::new().push_opcode(OP_DUP).push_opcode(OP_HASH160), &[0u8; 20])
            .unwrap()
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert!(match_job(&p2pkh).is_none());

        // Boost header without validation tail
        let full = encode_job_script(&job()).unwrap();
        let headless = &full.as_bytes()[..full.len() - 7];
        assert!(match_job(script(headless)).is_none());

        // Garbage
        assert!(match_job(script(&[0x4e, 0xff])).is_none());
        assert!(match_job(script(&[])).is_none());
    }

    #[test]
    fn matches_proof() {
        let script = encode_proof_script(&proof()).unwrap();
        assert_eq!(match_proof(&script), Some(proof()));

        let mut contract = proof();
        contract.miner_pubkey_hash = None;
        assert_eq!(match_proof(&encode_proof_script(&contract).unwrap()), Some(contract));
    }

    #[test]
    fn rejects_p2pkh_unlock() {
        let sig = push(push(Builder::new(), &[0x30; 71]).unwrap(), &[0x02; 33])
            .unwrap()
            .into_script();
        assert!(match_proof(&sig).is_none());
    }

    #[test]
    fn rejects_bad_pubkey_prefix() {
        let mut p = proof();
        p.pubkey[0] = 0x05;
        assert!(match_proof(&encode_proof_script(&p).unwrap()).is_none());
    }

    #[test]
    fn truncated_push_is_not_a_proof() {
        assert!(match_proof(script(&[0x05, 1, 2])).is_none());
        assert!(match_proof(script(&[0x4d, 0x01])).is_none());
    }

    #[test]
    fn data_carrier_protocol() {
        let header = Builder::new().push_opcode(OP_FALSE).push_opcode(OP_RETURN);
        let carrier = push(push(header, b"19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAXi").unwrap(), b"hello")
            .unwrap()
            .into_script();
        assert_eq!(
            match_data_carrier(&carrier),
            Some(Some("19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAXi".to_string()))
        );

        assert_eq!(match_data_carrier(script(&[0x6a, 0x02, 0x00, 0x01])), Some(None));
        assert_eq!(match_data_carrier(script(&[0x6a, 0x09])), Some(None));
        assert_eq!(match_data_carrier(script(&[0x76, 0xa9])), None);
    }
}
