//! Capability executor.
//!
//! Runs one already-authorized request against the account's keys or the
//! payment connector. Never decides authorization.

mod keys;
mod payment;

use std::sync::Arc;

pub use keys::{AccountKeys, LocalKeyring};
pub use payment::{PaymentConnector, PaymentReceipt, payment_hash};

use crate::capability::{CapabilityOutput, CapabilityPayload, PreparedTransaction};
use crate::error::ExecutorError;
use crate::psbt::validate_final_bytes;

pub struct CapabilityExecutor {
    keys: Arc<dyn AccountKeys>,
    payments: Option<Arc<dyn PaymentConnector>>,
}

impl CapabilityExecutor {
    pub fn new(keys: Arc<dyn AccountKeys>) -> Self {
        Self {
            keys,
            payments: None,
        }
    }

    pub fn with_payment_connector(mut self, connector: Arc<dyn PaymentConnector>) -> Self {
        self.payments = Some(connector);
        self
    }

    pub async fn execute(
        &self,
        payload: &CapabilityPayload,
    ) -> Result<CapabilityOutput, ExecutorError> {
        match payload {
            CapabilityPayload::Encrypt { peer, plaintext } => self
                .keys
                .encrypt(peer.public_key(), plaintext)
                .await
                .map(CapabilityOutput::Text),
            CapabilityPayload::Decrypt { peer, ciphertext } => self
                .keys
                .decrypt(peer.public_key(), ciphertext)
                .await
                .map(CapabilityOutput::Text),
            CapabilityPayload::SignMessage { message } => {
                let signature = self.keys.sign_message(message).await?;
                Ok(CapabilityOutput::MessageSignature {
                    message: message.clone(),
                    signature,
                })
            }
            CapabilityPayload::SignTransaction(prepared) => self.sign_transaction(prepared).await,
            CapabilityPayload::SendPayment(request) => {
                let connector = self.payments.as_ref().ok_or_else(|| {
                    ExecutorError::Unavailable("no payment connector configured".to_string())
                })?;
                let receipt = connector.keysend(request).await?;
                let payment_hash = payment_hash(&receipt.preimage)?;
                Ok(CapabilityOutput::Payment {
                    preimage: receipt.preimage,
                    payment_hash,
                })
            }
        }
    }

    /// Sign, finalize and extract. Only a broadcast-ready transaction
    /// leaves this function.
    async fn sign_transaction(
        &self,
        prepared: &PreparedTransaction,
    ) -> Result<CapabilityOutput, ExecutorError> {
        let mut psbt = prepared.psbt.clone();
        self.keys.sign_transaction(&mut psbt).await?;
        psbt.finalize_key_spends();

        let unsigned_inputs = psbt.unfinalized_inputs();
        if !unsigned_inputs.is_empty() {
            return Err(ExecutorError::IncompleteSignature { unsigned_inputs });
        }

        let signed = psbt.extract()?.encode();
        if !validate_final_bytes(&signed) {
            return Err(ExecutorError::IncompleteSignature {
                unsigned_inputs: (0..psbt.inputs.len()).collect(),
            });
        }

        Ok(CapabilityOutput::SignedTransaction {
            signed: hex::encode(signed),
            is_final: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::capability::{Capability, PaymentRequest};
    use crate::network::Network;

    struct FixedPreimage(String);

    #[async_trait]
    impl PaymentConnector for FixedPreimage {
        async fn keysend(&self, _: &PaymentRequest) -> Result<PaymentReceipt, ExecutorError> {
            Ok(PaymentReceipt {
                preimage: self.0.clone(),
            })
        }
    }

    fn payment_payload() -> CapabilityPayload {
        CapabilityPayload::parse(
            Capability::SendPayment,
            &json!({
                "destination": "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
                "amount": 21
            }),
            Network::Mainnet,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn payment_without_connector_fails() {
        let executor = CapabilityExecutor::new(Arc::new(LocalKeyring::generate()));
        let err = executor.execute(&payment_payload()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn payment_reports_preimage_hash() {
        let executor = CapabilityExecutor::new(Arc::new(LocalKeyring::generate()))
            .with_payment_connector(Arc::new(FixedPreimage("00".repeat(32))));

        let output = executor.execute(&payment_payload()).await.unwrap();
        assert_eq!(
            output,
            CapabilityOutput::Payment {
                preimage: "00".repeat(32),
                payment_hash: "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
                    .to_string(),
            }
        );
    }

    #[tokio::test]
    async fn sign_message_echoes_message() {
        let executor = CapabilityExecutor::new(Arc::new(LocalKeyring::generate()));
        let payload = CapabilityPayload::parse(
            Capability::SignMessage,
            &json!({ "message": "login" }),
            Network::Mainnet,
        )
        .unwrap();

        let CapabilityOutput::MessageSignature { message, signature } =
            executor.execute(&payload).await.unwrap()
        else {
            panic!("expected message signature");
        };
        assert_eq!(message, "login");
        assert_eq!(signature.len(), 128);
    }
}
