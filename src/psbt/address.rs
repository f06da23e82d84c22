//! Output script to address rendering.

use bech32::Fe32;

use crate::error::PsbtError;
use crate::network::Network;

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// Render a standard output script as an address on `network`.
///
/// Returns `None` for scripts without an address form (bare multisig,
/// OP_RETURN, non-standard).
pub fn script_to_address(script: &[u8], network: Network) -> Option<String> {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Some(base58check(network.p2pkh_prefix(), hash))
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            Some(base58check(network.p2sh_prefix(), hash))
        }
        [version_op, push_len, program @ ..] => {
            let version = witness_version(*version_op)?;
            if *push_len as usize != program.len() || !(2..=40).contains(&program.len()) {
                return None;
            }
            if version == 0 && program.len() != 20 && program.len() != 32 {
                return None;
            }
            let version = Fe32::try_from(version).ok()?;
            bech32::segwit::encode(network.bech32_hrp(), version, program).ok()
        }
        _ => None,
    }
}

/// Parse an address for `network` back into its output script.
pub fn address_to_script(address: &str, network: Network) -> Result<Vec<u8>, PsbtError> {
    let invalid = |reason: String| PsbtError::InvalidField {
        field: "address",
        reason,
    };

    if let Ok((hrp, version, program)) = bech32::segwit::decode(address) {
        if hrp != network.bech32_hrp() {
            return Err(PsbtError::NetworkMismatch {
                expected: network,
                found: format!("address prefix '{hrp}'"),
            });
        }
        let version = version.to_u8();
        let version_op = if version == 0 { OP_0 } else { OP_1 + version - 1 };
        let mut script = vec![version_op, program.len() as u8];
        script.extend_from_slice(&program);
        return Ok(script);
    }

    let payload = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| invalid(e.to_string()))?;
    let [prefix, hash @ ..] = payload.as_slice() else {
        return Err(invalid("empty payload".to_string()));
    };
    if hash.len() != 20 {
        return Err(invalid(format!("expected 20-byte hash, got {}", hash.len())));
    }

    let mut script = Vec::with_capacity(25);
    if *prefix == network.p2pkh_prefix() {
        script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
        script.extend_from_slice(hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    } else if *prefix == network.p2sh_prefix() {
        script.extend_from_slice(&[OP_HASH160, 0x14]);
        script.extend_from_slice(hash);
        script.push(OP_EQUAL);
    } else {
        return Err(PsbtError::NetworkMismatch {
            expected: network,
            found: format!("address version {prefix:#04x}"),
        });
    }
    Ok(script)
}

/// Pay-to-taproot output script for an x-only output key.
pub fn p2tr_script(output_key: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.extend_from_slice(&[OP_1, 0x20]);
    script.extend_from_slice(output_key);
    script
}

fn witness_version(op: u8) -> Option<u8> {
    match op {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some(op - OP_1 + 1),
        _ => None,
    }
}

fn base58check(prefix: u8, hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + hash.len());
    payload.push(prefix);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}
