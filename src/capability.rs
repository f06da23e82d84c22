//! Capabilities callers can request and their validated payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Value, json};

use crate::error::PayloadError;
use crate::network::Network;
use crate::psbt::{Psbt, TransactionPreview, preview_psbt};

/// Lightning custom TLV records must use types in the odd custom range.
const MIN_CUSTOM_RECORD_TYPE: u64 = 65_536;

/// Privileged operation a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Encrypt,
    Decrypt,
    SignMessage,
    SignTransaction,
    SendPayment,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Encrypt,
        Capability::Decrypt,
        Capability::SignMessage,
        Capability::SignTransaction,
        Capability::SendPayment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Encrypt => "encrypt",
            Capability::Decrypt => "decrypt",
            Capability::SignMessage => "sign_message",
            Capability::SignTransaction => "sign_transaction",
            Capability::SendPayment => "send_payment",
        }
    }

    /// Parse a wire name. Accepts `snake_case`, camelCase and the legacy
    /// provider method names (`nip44Encrypt`, `signPsbt`, `keysend`), with an
    /// optional `namespace/` prefix.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let name = raw.trim().rsplit('/').next().unwrap_or_default();
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "encrypt" | "nip44encrypt" | "nip04encrypt" => Ok(Capability::Encrypt),
            "decrypt" | "nip44decrypt" | "nip04decrypt" => Ok(Capability::Decrypt),
            "signmessage" => Ok(Capability::SignMessage),
            "signtransaction" | "signpsbt" => Ok(Capability::SignTransaction),
            "sendpayment" | "keysend" => Ok(Capability::SendPayment),
            _ => Err(PayloadError::UnknownCapability(raw.to_string())),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counterparty public key for encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerKey {
    hex: String,
    key: k256::PublicKey,
}

impl PeerKey {
    /// Accepts a 33-byte SEC1 compressed key or a 32-byte x-only key (even y).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let bytes = hex::decode(raw.trim()).map_err(|e| format!("peer is not hex: {e}"))?;
        let sec1 = match bytes.len() {
            32 => [&[0x02][..], &bytes].concat(),
            33 => bytes,
            n => return Err(format!("peer key must be 32 or 33 bytes, got {n}")),
        };
        let key = k256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| "peer is not a valid secp256k1 point".to_string())?;
        Ok(Self {
            hex: raw.trim().to_ascii_lowercase(),
            key,
        })
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    pub fn public_key(&self) -> &k256::PublicKey {
        &self.key
    }
}

/// Decoded PSBT plus the preview computed before any prompt is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub psbt: Psbt,
    pub preview: TransactionPreview,
    pub network: Network,
}

/// Keysend request passed to the payment connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub destination: String,
    /// Amount in satoshis.
    pub amount: u64,
    pub custom_records: BTreeMap<u64, String>,
}

/// Structurally validated arguments, one variant per capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityPayload {
    Encrypt { peer: PeerKey, plaintext: String },
    Decrypt { peer: PeerKey, ciphertext: String },
    SignMessage { message: String },
    SignTransaction(Box<PreparedTransaction>),
    SendPayment(PaymentRequest),
}

#[derive(Deserialize)]
struct EncryptArgs {
    peer: String,
    plaintext: String,
}

#[derive(Deserialize)]
struct DecryptArgs {
    peer: String,
    ciphertext: String,
}

#[derive(Deserialize)]
struct SignMessageArgs {
    message: String,
}

#[derive(Deserialize)]
struct SignTransactionArgs {
    psbt: String,
    #[serde(default)]
    network: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendPaymentArgs {
    destination: String,
    #[serde(deserialize_with = "deserialize_sats")]
    amount: u64,
    #[serde(default)]
    custom_records: BTreeMap<String, String>,
}

impl CapabilityPayload {
    /// Validate `args` for `capability`. Transaction payloads are decoded and
    /// previewed against `network` here, before any prompt or execution.
    pub fn parse(
        capability: Capability,
        args: &Value,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let invalid = |reason: String| PayloadError::InvalidArgs {
            capability: capability.as_str(),
            reason,
        };

        match capability {
            Capability::Encrypt => {
                let args: EncryptArgs = from_args(capability, args)?;
                Ok(Self::Encrypt {
                    peer: PeerKey::parse(&args.peer).map_err(invalid)?,
                    plaintext: args.plaintext,
                })
            }
            Capability::Decrypt => {
                let args: DecryptArgs = from_args(capability, args)?;
                if args.ciphertext.trim().is_empty() {
                    return Err(invalid("ciphertext is empty".to_string()));
                }
                Ok(Self::Decrypt {
                    peer: PeerKey::parse(&args.peer).map_err(invalid)?,
                    ciphertext: args.ciphertext,
                })
            }
            Capability::SignMessage => {
                let args: SignMessageArgs = from_args(capability, args)?;
                if args.message.is_empty() {
                    return Err(invalid("message is empty".to_string()));
                }
                Ok(Self::SignMessage {
                    message: args.message,
                })
            }
            Capability::SignTransaction => {
                let args: SignTransactionArgs = from_args(capability, args)?;
                if let Some(requested) = args.network.as_deref() {
                    let requested = Network::parse(requested)
                        .ok_or_else(|| invalid(format!("unknown network '{requested}'")))?;
                    if requested != network {
                        return Err(crate::error::PsbtError::NetworkMismatch {
                            expected: network,
                            found: requested.to_string(),
                        }
                        .into());
                    }
                }
                let psbt = Psbt::from_payload(&args.psbt)?;
                let preview = preview_psbt(&psbt, network)?;
                Ok(Self::SignTransaction(Box::new(PreparedTransaction {
                    psbt,
                    preview,
                    network,
                })))
            }
            Capability::SendPayment => {
                let args: SendPaymentArgs = from_args(capability, args)?;
                let destination = args.destination.trim().to_ascii_lowercase();
                let destination_bytes = hex::decode(&destination)
                    .map_err(|e| invalid(format!("destination is not hex: {e}")))?;
                if destination_bytes.len() != 33
                    || k256::PublicKey::from_sec1_bytes(&destination_bytes).is_err()
                {
                    return Err(invalid(
                        "destination must be a 33-byte compressed node public key".to_string(),
                    ));
                }
                if args.amount == 0 {
                    return Err(invalid("amount must be positive".to_string()));
                }

                let mut custom_records = BTreeMap::new();
                for (record_type, value) in args.custom_records {
                    let parsed: u64 = record_type
                        .parse()
                        .map_err(|_| invalid(format!("custom record type '{record_type}' is not a number")))?;
                    if parsed < MIN_CUSTOM_RECORD_TYPE {
                        return Err(invalid(format!(
                            "custom record type {parsed} is below {MIN_CUSTOM_RECORD_TYPE}"
                        )));
                    }
                    hex::decode(&value)
                        .map_err(|_| invalid(format!("custom record {parsed} value is not hex")))?;
                    custom_records.insert(parsed, value.to_ascii_lowercase());
                }

                Ok(Self::SendPayment(PaymentRequest {
                    destination,
                    amount: args.amount,
                    custom_records,
                }))
            }
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Encrypt { .. } => Capability::Encrypt,
            Self::Decrypt { .. } => Capability::Decrypt,
            Self::SignMessage { .. } => Capability::SignMessage,
            Self::SignTransaction(_) => Capability::SignTransaction,
            Self::SendPayment(_) => Capability::SendPayment,
        }
    }

    /// What the user sees before deciding. Transaction requests show the
    /// preview instead of the raw PSBT.
    pub fn review_payload(&self) -> Value {
        match self {
            Self::Encrypt { peer, plaintext } => json!({
                "peer": peer.as_hex(),
                "plaintext": plaintext,
            }),
            Self::Decrypt { peer, ciphertext } => json!({
                "peer": peer.as_hex(),
                "ciphertext": ciphertext,
            }),
            Self::SignMessage { message } => json!({ "message": message }),
            Self::SignTransaction(prepared) => {
                serde_json::to_value(&prepared.preview).unwrap_or(Value::Null)
            }
            Self::SendPayment(request) => serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }
}

/// Result of a successful capability execution, serialized as `Response.data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CapabilityOutput {
    /// Ciphertext or plaintext.
    Text(String),
    MessageSignature {
        message: String,
        signature: String,
    },
    SignedTransaction {
        signed: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    Payment {
        preimage: String,
        #[serde(rename = "paymentHash")]
        payment_hash: String,
    },
}

fn from_args<T: for<'de> Deserialize<'de>>(
    capability: Capability,
    args: &Value,
) -> Result<T, PayloadError> {
    T::deserialize(args).map_err(|e| PayloadError::InvalidArgs {
        capability: capability.as_str(),
        reason: e.to_string(),
    })
}

fn deserialize_sats<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid amount '{s}'"))),
    }
}
