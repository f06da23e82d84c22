//! BIP-341 signature hash for taproot key-path spends.

use sha2::{Digest, Sha256};

use super::codec::Psbt;
use super::encoding::write_var_bytes;
use crate::error::PsbtError;

const SIGHASH_DEFAULT: u8 = 0x00;
const SIGHASH_ALL: u8 = 0x01;

/// Digest to sign plus the hash type byte it commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSighash {
    pub digest: [u8; 32],
    pub hash_type: u8,
}

impl TapSighash {
    /// Whether the hash type byte must be appended to the 64-byte signature.
    pub fn needs_suffix(&self) -> bool {
        self.hash_type != SIGHASH_DEFAULT
    }
}

/// BIP-340 tagged hash: `sha256(sha256(tag) || sha256(tag) || data...)`.
pub fn tagged_hash(tag: &str, chunks: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}

/// Key-path sighash for `input_index`. Only SIGHASH_DEFAULT and SIGHASH_ALL
/// are supported; every input must expose its spent output.
pub fn taproot_key_spend_sighash(psbt: &Psbt, input_index: usize) -> Result<TapSighash, PsbtError> {
    let tx = &psbt.unsigned_tx;
    let input = psbt
        .inputs
        .get(input_index)
        .ok_or(PsbtError::InputOutOfRange(input_index))?;

    let hash_type = match input.sighash_type {
        None => SIGHASH_DEFAULT,
        Some(t) if t == u32::from(SIGHASH_DEFAULT) || t == u32::from(SIGHASH_ALL) => t as u8,
        Some(t) => return Err(PsbtError::UnsupportedSighash(t)),
    };

    let prevouts = (0..tx.inputs.len())
        .map(|i| psbt.spent_output(i))
        .collect::<Result<Vec<_>, _>>()?;

    let mut prevout_data = Vec::new();
    let mut amount_data = Vec::new();
    let mut script_data = Vec::new();
    let mut sequence_data = Vec::new();
    for (txin, spent) in tx.inputs.iter().zip(&prevouts) {
        prevout_data.extend_from_slice(&txin.previous_output.txid);
        prevout_data.extend_from_slice(&txin.previous_output.vout.to_le_bytes());
        amount_data.extend_from_slice(&spent.value.to_le_bytes());
        write_var_bytes(&mut script_data, &spent.script_pubkey);
        sequence_data.extend_from_slice(&txin.sequence.to_le_bytes());
    }

    let mut output_data = Vec::new();
    for output in &tx.outputs {
        output.write(&mut output_data);
    }

    let mut msg = Vec::with_capacity(1 + 1 + 4 + 4 + 32 * 5 + 1 + 4);
    msg.push(0x00); // epoch
    msg.push(hash_type);
    msg.extend_from_slice(&tx.version.to_le_bytes());
    msg.extend_from_slice(&tx.lock_time.to_le_bytes());
    msg.extend_from_slice(&Sha256::digest(&prevout_data));
    msg.extend_from_slice(&Sha256::digest(&amount_data));
    msg.extend_from_slice(&Sha256::digest(&script_data));
    msg.extend_from_slice(&Sha256::digest(&sequence_data));
    msg.extend_from_slice(&Sha256::digest(&output_data));
    msg.push(0x00); // spend type: key path, no annex
    msg.extend_from_slice(&(input_index as u32).to_le_bytes());

    Ok(TapSighash {
        digest: tagged_hash("TapSighash", &[&msg]),
        hash_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psbt::transaction::{OutPoint, Transaction, TxIn, TxOut};

    fn two_input_psbt() -> Psbt {
        let txin = |vout| TxIn {
            previous_output: OutPoint {
                txid: [5u8; 32],
                vout,
            },
            script_sig: Vec::new(),
            sequence: 0xffff_fffd,
            witness: Vec::new(),
        };
        let tx = Transaction {
            version: 2,
            inputs: vec![txin(0), txin(1)],
            outputs: vec![TxOut {
                value: 1_500,
                script_pubkey: vec![0x51, 0x02, 0x4e, 0x73],
            }],
            lock_time: 0,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
        for input in &mut psbt.inputs {
            input.witness_utxo = Some(TxOut {
                value: 1_000,
                script_pubkey: vec![0x51, 0x20, 0x01],
            });
        }
        psbt
    }

    #[test]
    fn digest_commits_to_input_index() {
        let psbt = two_input_psbt();
        let first = taproot_key_spend_sighash(&psbt, 0).unwrap();
        let second = taproot_key_spend_sighash(&psbt, 1).unwrap();
        assert_ne!(first.digest, second.digest);
        assert!(!first.needs_suffix());
    }

    #[test]
    fn digest_commits_to_spent_amounts() {
        let psbt = two_input_psbt();
        let mut altered = psbt.clone();
        if let Some(utxo) = altered.inputs[1].witness_utxo.as_mut() {
            utxo.value += 1;
        }
        assert_ne!(
            taproot_key_spend_sighash(&psbt, 0).unwrap().digest,
            taproot_key_spend_sighash(&altered, 0).unwrap().digest
        );
    }

    #[test]
    fn requires_every_spent_output() {
        let mut psbt = two_input_psbt();
        psbt.inputs[1].witness_utxo = None;
        assert_eq!(
            taproot_key_spend_sighash(&psbt, 0),
            Err(PsbtError::MissingUtxo(1))
        );
    }

    #[test]
    fn rejects_single_and_anyonecanpay() {
        let mut psbt = two_input_psbt();
        psbt.inputs[0].sighash_type = Some(0x83);
        assert_eq!(
            taproot_key_spend_sighash(&psbt, 0),
            Err(PsbtError::UnsupportedSighash(0x83))
        );

        psbt.inputs[0].sighash_type = Some(0x01);
        assert!(taproot_key_spend_sighash(&psbt, 0).unwrap().needs_suffix());
    }
}
