//! Lightning payment connector seam.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::capability::PaymentRequest;
use crate::error::ExecutorError;

/// What a connector reports after settling a keysend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Hex payment preimage.
    pub preimage: String,
}

/// A node connection able to send spontaneous payments.
#[async_trait]
pub trait PaymentConnector: Send + Sync {
    async fn keysend(&self, request: &PaymentRequest) -> Result<PaymentReceipt, ExecutorError>;
}

/// Validate a 32-byte hex preimage and return its payment hash.
pub fn payment_hash(preimage: &str) -> Result<String, ExecutorError> {
    let bytes = hex::decode(preimage)
        .ok()
        .filter(|b| b.len() == 32)
        .ok_or_else(|| {
            ExecutorError::Primitive("payment connector returned a malformed preimage".to_string())
        })?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_zero_preimage() {
        assert_eq!(
            payment_hash(&"00".repeat(32)).unwrap(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn short_preimage_is_rejected() {
        assert!(payment_hash("abcd").is_err());
        assert!(payment_hash("not hex").is_err());
    }
}
