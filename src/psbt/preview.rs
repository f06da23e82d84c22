//! Human-reviewable summary of a PSBT and the final-transaction gate.

use serde::{Deserialize, Serialize};

use super::address::script_to_address;
use super::codec::{Psbt, decode_payload, has_magic};
use super::transaction::{Transaction, TxOut};
use crate::error::PsbtError;
use crate::network::Network;

/// 21 million BTC in satoshis.
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// One input or output as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    /// `None` when the script has no address form.
    pub address: Option<String>,
    pub amount: u64,
    /// Hex script, present only when there is no address to show.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPreview {
    pub inputs: Vec<PreviewEntry>,
    pub outputs: Vec<PreviewEntry>,
    pub fee: u64,
}

impl PreviewEntry {
    fn from_output(output: &TxOut, network: Network) -> Self {
        match script_to_address(&output.script_pubkey, network) {
            Some(address) => Self {
                address: Some(address),
                amount: output.value,
                script: None,
            },
            None => Self {
                address: None,
                amount: output.value,
                script: Some(hex::encode(&output.script_pubkey)),
            },
        }
    }
}

/// Decode a hex or base64 PSBT and summarize it for `network`.
pub fn preview(payload: &str, network: Network) -> Result<TransactionPreview, PsbtError> {
    preview_psbt(&Psbt::from_payload(payload)?, network)
}

/// Summarize an already-decoded PSBT. Pure: the PSBT is not modified.
pub fn preview_psbt(psbt: &Psbt, network: Network) -> Result<TransactionPreview, PsbtError> {
    check_network(psbt, network)?;

    let spent = (0..psbt.inputs.len())
        .map(|i| psbt.spent_output(i))
        .collect::<Result<Vec<_>, _>>()?;

    let total_in = checked_total(&spent)?;
    let total_out = checked_total(&psbt.unsigned_tx.outputs)?;
    let fee = total_in
        .checked_sub(total_out)
        .ok_or(PsbtError::NegativeFee)?;

    Ok(TransactionPreview {
        inputs: spent
            .iter()
            .map(|output| PreviewEntry::from_output(output, network))
            .collect(),
        outputs: psbt
            .unsigned_tx
            .outputs
            .iter()
            .map(|output| PreviewEntry::from_output(output, network))
            .collect(),
        fee,
    })
}

/// Whether a signed payload is broadcast-ready.
///
/// Accepts a hex or base64 PSBT (every input finalized) or a raw network
/// transaction (every input carries a scriptSig or witness). Anything that
/// fails to decode is not final.
pub fn validate_final(signed_payload: &str) -> bool {
    decode_payload(signed_payload)
        .map(|bytes| validate_final_bytes(&bytes))
        .unwrap_or(false)
}

pub fn validate_final_bytes(bytes: &[u8]) -> bool {
    if has_magic(bytes) {
        return Psbt::decode(bytes).is_ok_and(|psbt| psbt.is_final());
    }
    Transaction::decode(bytes).is_ok_and(|tx| {
        !tx.inputs.is_empty()
            && tx
                .inputs
                .iter()
                .all(|input| !input.script_sig.is_empty() || !input.witness.is_empty())
    })
}

fn checked_total(outputs: &[TxOut]) -> Result<u64, PsbtError> {
    outputs.iter().try_fold(0u64, |total, output| {
        if output.value > MAX_MONEY {
            return Err(PsbtError::AmountOverflow);
        }
        total
            .checked_add(output.value)
            .filter(|sum| *sum <= MAX_MONEY)
            .ok_or(PsbtError::AmountOverflow)
    })
}

fn check_network(psbt: &Psbt, network: Network) -> Result<(), PsbtError> {
    let expected = network.xpub_version();
    for (key, _) in &psbt.xpubs {
        let version = &key[1..5];
        if version != expected {
            return Err(PsbtError::NetworkMismatch {
                expected: network,
                found: describe_xpub_version(version),
            });
        }
    }
    Ok(())
}

fn describe_xpub_version(version: &[u8]) -> String {
    match version {
        [0x04, 0x88, 0xb2, 0x1e] => "mainnet (xpub)".to_string(),
        [0x04, 0x35, 0x87, 0xcf] => "testnet (tpub)".to_string(),
        other => format!("unknown xpub version {}", hex::encode(other)),
    }
}
