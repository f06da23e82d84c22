//! Transaction preview, validation and taproot key-path signing support.
//!
//! A minimal BIP-174 codec: enough to show the user what a PSBT spends,
//! sign taproot key-path inputs owned by the active account, finalize them
//! and extract the network transaction.

mod address;
mod codec;
mod encoding;
mod preview;
mod sighash;
mod transaction;

pub use address::{address_to_script, p2tr_script, script_to_address};
pub use codec::{Psbt, PsbtInput, PsbtOutput, RawPair, decode_payload};
pub use preview::{
    MAX_MONEY, PreviewEntry, TransactionPreview, preview, preview_psbt, validate_final,
    validate_final_bytes,
};
pub use sighash::{TapSighash, tagged_hash, taproot_key_spend_sighash};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
