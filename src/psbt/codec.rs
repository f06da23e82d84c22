//! BIP-174 partially signed transaction container.
//!
//! Only the fields the broker reads or writes are decoded. Every other
//! key-value pair is carried through untouched so that a PSBT produced by
//! another wallet survives a decode/encode cycle.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::encoding::{Reader, write_var_bytes};
use super::transaction::{Transaction, TxOut, read_witness, write_witness};
use crate::error::PsbtError;

const MAGIC: &[u8; 5] = b"psbt\xff";

const GLOBAL_UNSIGNED_TX: u8 = 0x00;
const GLOBAL_XPUB: u8 = 0x01;
const GLOBAL_VERSION: u8 = 0xfb;

const IN_NON_WITNESS_UTXO: u8 = 0x00;
const IN_WITNESS_UTXO: u8 = 0x01;
const IN_SIGHASH_TYPE: u8 = 0x03;
const IN_FINAL_SCRIPTSIG: u8 = 0x07;
const IN_FINAL_SCRIPTWITNESS: u8 = 0x08;
const IN_TAP_KEY_SIG: u8 = 0x13;
const IN_TAP_INTERNAL_KEY: u8 = 0x17;
/// Highest input key type defined by BIP-174 / BIP-371.
const IN_LAST_DEFINED: u8 = 0x18;

/// Raw key-value pair; the key includes its type byte.
pub type RawPair = (Vec<u8>, Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psbt {
    pub unsigned_tx: Transaction,
    /// Global xpub entries (key = type byte + 78-byte extended key).
    pub xpubs: Vec<RawPair>,
    pub version: Option<u32>,
    pub unknown: Vec<RawPair>,
    pub inputs: Vec<PsbtInput>,
    pub outputs: Vec<PsbtOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtInput {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<TxOut>,
    pub sighash_type: Option<u32>,
    pub final_script_sig: Option<Vec<u8>>,
    pub final_script_witness: Option<Vec<Vec<u8>>>,
    pub tap_key_sig: Option<Vec<u8>>,
    pub tap_internal_key: Option<[u8; 32]>,
    pub unknown: Vec<RawPair>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtOutput {
    pub unknown: Vec<RawPair>,
}

impl PsbtInput {
    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some() || self.final_script_witness.is_some()
    }
}

/// Decode a caller-supplied payload string: hex first, then base64.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PsbtError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(PsbtError::Encoding);
    }
    if let Ok(bytes) = hex::decode(trimmed) {
        return Ok(bytes);
    }
    BASE64.decode(trimmed).map_err(|_| PsbtError::Encoding)
}

/// Whether the bytes start with the PSBT magic.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

impl Psbt {
    /// Build an empty PSBT around an unsigned transaction.
    pub fn from_unsigned_tx(unsigned_tx: Transaction) -> Result<Self, PsbtError> {
        ensure_unsigned(&unsigned_tx)?;
        Ok(Self {
            inputs: vec![PsbtInput::default(); unsigned_tx.inputs.len()],
            outputs: vec![PsbtOutput::default(); unsigned_tx.outputs.len()],
            unsigned_tx,
            xpubs: Vec::new(),
            version: None,
            unknown: Vec::new(),
        })
    }

    /// Parse a hex or base64 payload string.
    pub fn from_payload(payload: &str) -> Result<Self, PsbtError> {
        Self::decode(&decode_payload(payload)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PsbtError> {
        let mut reader = Reader::new(bytes);
        if reader.take(MAGIC.len(), "magic").ok() != Some(&MAGIC[..]) {
            return Err(PsbtError::BadMagic);
        }

        let mut unsigned_tx = None;
        let mut xpubs = Vec::new();
        let mut version = None;
        let mut unknown = Vec::new();

        for (key, value) in read_map(&mut reader, "global")? {
            match key[0] {
                GLOBAL_UNSIGNED_TX => {
                    expect_bare_key(key, "unsigned transaction")?;
                    let tx = Transaction::decode(value)?;
                    ensure_unsigned(&tx)?;
                    unsigned_tx = Some(tx);
                }
                GLOBAL_XPUB => {
                    if key.len() != 79 {
                        return Err(PsbtError::InvalidField {
                            field: "global xpub",
                            reason: format!("expected 78-byte extended key, got {}", key.len() - 1),
                        });
                    }
                    xpubs.push((key.to_vec(), value.to_vec()));
                }
                GLOBAL_VERSION => {
                    expect_bare_key(key, "version")?;
                    let v = u32::from_le_bytes(fixed(value, "version")?);
                    if v != 0 {
                        return Err(PsbtError::UnsupportedVersion(v));
                    }
                    version = Some(v);
                }
                _ => unknown.push((key.to_vec(), value.to_vec())),
            }
        }

        let unsigned_tx = unsigned_tx.ok_or(PsbtError::MissingUnsignedTx)?;

        let mut inputs = Vec::with_capacity(unsigned_tx.inputs.len());
        for _ in 0..unsigned_tx.inputs.len() {
            inputs.push(read_input(&mut reader)?);
        }

        let mut outputs = Vec::with_capacity(unsigned_tx.outputs.len());
        for _ in 0..unsigned_tx.outputs.len() {
            let unknown = read_map(&mut reader, "output")?
                .into_iter()
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .collect();
            outputs.push(PsbtOutput { unknown });
        }

        reader.finish()?;

        Ok(Self {
            unsigned_tx,
            xpubs,
            version,
            unknown,
            inputs,
            outputs,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = MAGIC.to_vec();

        write_pair(
            &mut out,
            &[GLOBAL_UNSIGNED_TX],
            &self.unsigned_tx.encode_without_witness(),
        );
        for (key, value) in &self.xpubs {
            write_pair(&mut out, key, value);
        }
        if let Some(version) = self.version {
            write_pair(&mut out, &[GLOBAL_VERSION], &version.to_le_bytes());
        }
        for (key, value) in &self.unknown {
            write_pair(&mut out, key, value);
        }
        out.push(0x00);

        for input in &self.inputs {
            write_input(&mut out, input);
        }

        for output in &self.outputs {
            for (key, value) in &output.unknown {
                write_pair(&mut out, key, value);
            }
            out.push(0x00);
        }

        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Output spent by the given input, from its witness or non-witness UTXO.
    pub fn spent_output(&self, index: usize) -> Result<TxOut, PsbtError> {
        let input = self
            .inputs
            .get(index)
            .ok_or(PsbtError::InputOutOfRange(index))?;
        if let Some(utxo) = &input.witness_utxo {
            return Ok(utxo.clone());
        }

        let prev_tx = input
            .non_witness_utxo
            .as_ref()
            .ok_or(PsbtError::MissingUtxo(index))?;
        let outpoint = &self.unsigned_tx.inputs[index].previous_output;
        if prev_tx.txid() != outpoint.txid {
            return Err(PsbtError::UtxoMismatch { index });
        }
        prev_tx
            .outputs
            .get(outpoint.vout as usize)
            .cloned()
            .ok_or(PsbtError::UtxoMismatch { index })
    }

    /// Indices of inputs that carry neither a final scriptSig nor a final witness.
    pub fn unfinalized_inputs(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.is_finalized())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_final(&self) -> bool {
        !self.inputs.is_empty() && self.unfinalized_inputs().is_empty()
    }

    /// Turn taproot key-path signatures into final witnesses.
    ///
    /// Returns the number of inputs finalized by this call.
    pub fn finalize_key_spends(&mut self) -> usize {
        let mut finalized = 0;
        for input in &mut self.inputs {
            if input.is_finalized() {
                continue;
            }
            let Some(signature) = input.tap_key_sig.take() else {
                continue;
            };
            input.final_script_witness = Some(vec![signature]);
            input.tap_internal_key = None;
            input.sighash_type = None;
            input
                .unknown
                .retain(|(key, _)| key.first().is_some_and(|t| *t > IN_LAST_DEFINED));
            finalized += 1;
        }
        finalized
    }

    /// Network transaction with final scriptSigs and witnesses applied.
    pub fn extract(&self) -> Result<Transaction, PsbtError> {
        if !self.is_final() {
            return Err(PsbtError::NotFinal);
        }
        let mut tx = self.unsigned_tx.clone();
        for (txin, input) in tx.inputs.iter_mut().zip(&self.inputs) {
            txin.script_sig = input.final_script_sig.clone().unwrap_or_default();
            txin.witness = input.final_script_witness.clone().unwrap_or_default();
        }
        Ok(tx)
    }
}

type BorrowedPair<'a> = (&'a [u8], &'a [u8]);

fn read_map<'a>(
    reader: &mut Reader<'a>,
    map: &'static str,
) -> Result<Vec<BorrowedPair<'a>>, PsbtError> {
    let mut pairs: Vec<BorrowedPair<'a>> = Vec::new();
    loop {
        let key = reader.read_var_bytes(map)?;
        if key.is_empty() {
            return Ok(pairs);
        }
        let value = reader.read_var_bytes(map)?;
        if pairs.iter().any(|(existing, _)| *existing == key) {
            return Err(PsbtError::DuplicateKey {
                map,
                key_type: key[0],
            });
        }
        pairs.push((key, value));
    }
}

fn read_input(reader: &mut Reader<'_>) -> Result<PsbtInput, PsbtError> {
    let mut input = PsbtInput::default();

    for (key, value) in read_map(reader, "input")? {
        match key[0] {
            IN_NON_WITNESS_UTXO => {
                expect_bare_key(key, "non-witness utxo")?;
                input.non_witness_utxo = Some(Transaction::decode(value)?);
            }
            IN_WITNESS_UTXO => {
                expect_bare_key(key, "witness utxo")?;
                let mut value_reader = Reader::new(value);
                let utxo = TxOut::read(&mut value_reader)?;
                value_reader.finish()?;
                input.witness_utxo = Some(utxo);
            }
            IN_SIGHASH_TYPE => {
                expect_bare_key(key, "sighash type")?;
                input.sighash_type = Some(u32::from_le_bytes(fixed(value, "sighash type")?));
            }
            IN_FINAL_SCRIPTSIG => {
                expect_bare_key(key, "final scriptSig")?;
                input.final_script_sig = Some(value.to_vec());
            }
            IN_FINAL_SCRIPTWITNESS => {
                expect_bare_key(key, "final witness")?;
                let mut value_reader = Reader::new(value);
                let witness = read_witness(&mut value_reader)?;
                value_reader.finish()?;
                input.final_script_witness = Some(witness);
            }
            IN_TAP_KEY_SIG => {
                expect_bare_key(key, "taproot key signature")?;
                if value.len() != 64 && value.len() != 65 {
                    return Err(PsbtError::InvalidField {
                        field: "taproot key signature",
                        reason: format!("expected 64 or 65 bytes, got {}", value.len()),
                    });
                }
                input.tap_key_sig = Some(value.to_vec());
            }
            IN_TAP_INTERNAL_KEY => {
                expect_bare_key(key, "taproot internal key")?;
                input.tap_internal_key = Some(fixed(value, "taproot internal key")?);
            }
            _ => input.unknown.push((key.to_vec(), value.to_vec())),
        }
    }

    Ok(input)
}

fn write_input(out: &mut Vec<u8>, input: &PsbtInput) {
    if let Some(tx) = &input.non_witness_utxo {
        write_pair(out, &[IN_NON_WITNESS_UTXO], &tx.encode());
    }
    if let Some(utxo) = &input.witness_utxo {
        let mut value = Vec::new();
        utxo.write(&mut value);
        write_pair(out, &[IN_WITNESS_UTXO], &value);
    }
    if let Some(sighash) = input.sighash_type {
        write_pair(out, &[IN_SIGHASH_TYPE], &sighash.to_le_bytes());
    }
    if let Some(script_sig) = &input.final_script_sig {
        write_pair(out, &[IN_FINAL_SCRIPTSIG], script_sig);
    }
    if let Some(witness) = &input.final_script_witness {
        let mut value = Vec::new();
        write_witness(&mut value, witness);
        write_pair(out, &[IN_FINAL_SCRIPTWITNESS], &value);
    }
    if let Some(signature) = &input.tap_key_sig {
        write_pair(out, &[IN_TAP_KEY_SIG], signature);
    }
    if let Some(internal_key) = &input.tap_internal_key {
        write_pair(out, &[IN_TAP_INTERNAL_KEY], internal_key);
    }
    for (key, value) in &input.unknown {
        write_pair(out, key, value);
    }
    out.push(0x00);
}

fn write_pair(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    write_var_bytes(out, key);
    write_var_bytes(out, value);
}

fn expect_bare_key(key: &[u8], field: &'static str) -> Result<(), PsbtError> {
    if key.len() == 1 {
        Ok(())
    } else {
        Err(PsbtError::InvalidField {
            field,
            reason: "key must not carry key data".to_string(),
        })
    }
}

fn fixed<const N: usize>(value: &[u8], field: &'static str) -> Result<[u8; N], PsbtError> {
    value.try_into().map_err(|_| PsbtError::InvalidField {
        field,
        reason: format!("expected {N} bytes, got {}", value.len()),
    })
}

fn ensure_unsigned(tx: &Transaction) -> Result<(), PsbtError> {
    if tx
        .inputs
        .iter()
        .any(|input| !input.script_sig.is_empty() || !input.witness.is_empty())
    {
        return Err(PsbtError::SignedUnsignedTx);
    }
    Ok(())
}
