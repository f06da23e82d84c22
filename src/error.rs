//! Error types for the wallet broker.

use crate::network::Network;

/// Error string returned to callers when the user rejected or dismissed a prompt.
///
/// Callers special-case this value, so it must never be produced for any
/// other failure.
pub const USER_REJECTED_ERROR: &str = "User rejected";

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors for the permission table.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// HTTP boundary errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },
}

/// Prompt exchange errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("A prompt for request {correlation_id} is already pending")]
    Duplicate { correlation_id: String },

    #[error("No pending prompt for request {correlation_id}")]
    UnknownRequest { correlation_id: String },
}

/// PSBT / raw transaction decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PsbtError {
    #[error("payload is neither hex nor base64")]
    Encoding,

    #[error("missing PSBT magic bytes")]
    BadMagic,

    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after end of data")]
    TrailingBytes(usize),

    #[error("duplicate key of type {key_type:#04x} in {map} map")]
    DuplicateKey { map: &'static str, key_type: u8 },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("missing unsigned transaction")]
    MissingUnsignedTx,

    #[error("unsigned transaction must not carry scriptSigs or witnesses")]
    SignedUnsignedTx,

    #[error("unsupported PSBT version {0}")]
    UnsupportedVersion(u32),

    #[error("input {0} carries no spent output (witness or non-witness UTXO)")]
    MissingUtxo(usize),

    #[error("input {index} non-witness UTXO does not match its outpoint")]
    UtxoMismatch { index: usize },

    #[error("input index {0} out of range")]
    InputOutOfRange(usize),

    #[error("unsupported sighash type {0:#x}")]
    UnsupportedSighash(u32),

    #[error("amount exceeds the maximum money supply")]
    AmountOverflow,

    #[error("outputs spend more than the inputs provide")]
    NegativeFee,

    #[error("payload was encoded for {found}, expected {expected}")]
    NetworkMismatch { expected: Network, found: String },

    #[error("transaction is not final")]
    NotFinal,
}

/// Structural validation failures, raised before any privileged operation runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Invalid arguments for {capability}: {reason}")]
    InvalidArgs {
        capability: &'static str,
        reason: String,
    },

    #[error("Invalid transaction: {0}")]
    Transaction(#[from] PsbtError),
}

/// Failures of the capability executor and the primitives behind it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("Incomplete signature: inputs {unsigned_inputs:?} are not final")]
    IncompleteSignature { unsigned_inputs: Vec<usize> },

    #[error("{0}")]
    Primitive(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl From<PsbtError> for ExecutorError {
    fn from(err: PsbtError) -> Self {
        ExecutorError::Payload(PayloadError::Transaction(err))
    }
}

/// Terminal failure of one authorization transaction.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("{}", USER_REJECTED_ERROR)]
    Rejected,

    #[error("{}", USER_REJECTED_ERROR)]
    Cancelled,

    #[error(transparent)]
    MalformedPayload(#[from] PayloadError),

    #[error("Incomplete signature: inputs {unsigned_inputs:?} are not final")]
    IncompleteSignature { unsigned_inputs: Vec<usize> },

    #[error("{0}")]
    ExecutorFailure(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl BrokerError {
    /// Whether this error is the user-rejection sentinel.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, BrokerError::Rejected | BrokerError::Cancelled)
    }

    /// Error string carried by the Response envelope.
    pub fn to_response_error(&self) -> String {
        self.to_string()
    }
}

impl From<ExecutorError> for BrokerError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::IncompleteSignature { unsigned_inputs } => {
                BrokerError::IncompleteSignature { unsigned_inputs }
            }
            ExecutorError::Payload(payload) => BrokerError::MalformedPayload(payload),
            ExecutorError::Primitive(detail) | ExecutorError::Unavailable(detail) => {
                BrokerError::ExecutorFailure(detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_and_cancellation_share_the_sentinel() {
        assert_eq!(BrokerError::Rejected.to_response_error(), USER_REJECTED_ERROR);
        assert_eq!(BrokerError::Cancelled.to_response_error(), USER_REJECTED_ERROR);
        assert!(BrokerError::Cancelled.is_user_rejection());
    }

    #[test]
    fn executor_failures_are_not_rejections() {
        let err = BrokerError::from(ExecutorError::Primitive("bad key".to_string()));
        assert!(!err.is_user_rejection());
        assert_eq!(err.to_response_error(), "bad key");

        let err = BrokerError::from(ExecutorError::IncompleteSignature {
            unsigned_inputs: vec![1],
        });
        assert_ne!(err.to_response_error(), USER_REJECTED_ERROR);
    }

    #[test]
    fn malformed_payload_passes_through_executor_conversion() {
        let err = BrokerError::from(ExecutorError::from(PsbtError::BadMagic));
        assert!(matches!(err, BrokerError::MalformedPayload(_)));
        assert_eq!(
            err.to_response_error(),
            "Invalid transaction: missing PSBT magic bytes"
        );
    }
}
