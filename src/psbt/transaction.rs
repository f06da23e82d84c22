//! Bitcoin transaction serialization (legacy and BIP-144 segwit forms).

use sha2::{Digest, Sha256};

use super::encoding::{Reader, write_compact_size, write_var_bytes};
use crate::error::PsbtError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    /// Transaction id in internal (little-endian) byte order.
    pub txid: [u8; 32],
    pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Amount in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl TxOut {
    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, PsbtError> {
        let value = reader.read_u64_le("output amount")?;
        let script_pubkey = reader.read_var_bytes("output script")?.to_vec();
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(out, &self.script_pubkey);
    }
}

impl Transaction {
    /// Decode a complete serialized transaction.
    pub fn decode(bytes: &[u8]) -> Result<Self, PsbtError> {
        let mut reader = Reader::new(bytes);
        let tx = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, PsbtError> {
        let version = reader.read_i32_le("transaction version")?;

        let mut input_count = reader.read_compact_size("input count")?;
        let mut segwit = false;
        if input_count == 0 {
            // BIP-144 marker is 0x00 followed by flag 0x01.
            let flag = reader.read_u8("segwit flag")?;
            if flag != 0x01 {
                return Err(PsbtError::InvalidField {
                    field: "transaction",
                    reason: format!("unsupported segwit flag {flag:#04x}"),
                });
            }
            segwit = true;
            input_count = reader.read_compact_size("input count")?;
        }

        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let txid = reader.read_array::<32>("input outpoint")?;
            let vout = reader.read_u32_le("input outpoint")?;
            let script_sig = reader.read_var_bytes("input scriptSig")?.to_vec();
            let sequence = reader.read_u32_le("input sequence")?;
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout },
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = reader.read_compact_size("output count")?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOut::read(reader)?);
        }

        if segwit {
            for input in &mut inputs {
                input.witness = read_witness(reader)?;
            }
        }

        let lock_time = reader.read_u32_le("lock time")?;

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Serialize, including witness data when any input carries some.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_inner(self.has_witness())
    }

    /// Serialize in the legacy form used for txids and PSBT unsigned transactions.
    pub fn encode_without_witness(&self) -> Vec<u8> {
        self.encode_inner(false)
    }

    fn encode_inner(&self, with_witness: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            out.extend_from_slice(&[0x00, 0x01]);
        }

        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.previous_output.txid);
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_var_bytes(&mut out, &input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut out);
        }

        if with_witness {
            for input in &self.inputs {
                write_witness(&mut out, &input.witness);
            }
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id in internal byte order (double SHA-256 of the legacy form).
    pub fn txid(&self) -> [u8; 32] {
        let first = Sha256::digest(self.encode_without_witness());
        Sha256::digest(first).into()
    }
}

pub(crate) fn read_witness(reader: &mut Reader<'_>) -> Result<Vec<Vec<u8>>, PsbtError> {
    let count = reader.read_compact_size("witness item count")?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(reader.read_var_bytes("witness item")?.to_vec());
    }
    Ok(items)
}

pub(crate) fn write_witness(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    write_compact_size(out, items.len() as u64);
    for item in items {
        write_var_bytes(out, item);
    }
}
