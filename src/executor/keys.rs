//! Account key material and the primitives that use it.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::elliptic_curve::PrimeField;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, PublicKey, Scalar, SecretKey, ecdsa, schnorr};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::ExecutorError;
use crate::psbt::{Psbt, p2tr_script, tagged_hash, taproot_key_spend_sighash};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HKDF_SALT: &[u8] = b"wallet-broker/v1";
const HKDF_INFO: &[u8] = b"aes-256-gcm";

/// Signing and encryption primitives of the active account.
#[async_trait]
pub trait AccountKeys: Send + Sync {
    /// Hex SEC1 compressed public key.
    fn public_key(&self) -> String;

    /// Hex compact ECDSA signature over SHA-256 of the message.
    async fn sign_message(&self, message: &str) -> Result<String, ExecutorError>;

    /// Base64 `nonce || ciphertext` for `peer`.
    async fn encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String, ExecutorError>;

    async fn decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String, ExecutorError>;

    /// Add key-path signatures for every input this account can spend.
    /// Returns how many inputs were signed.
    async fn sign_transaction(&self, psbt: &mut Psbt) -> Result<usize, ExecutorError>;
}

/// Keys held in process memory.
pub struct LocalKeyring {
    secret: SecretKey,
}

impl LocalKeyring {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn from_secret(secret_hex: &SecretString) -> Result<Self, ExecutorError> {
        let bytes = hex::decode(secret_hex.expose_secret().trim())
            .map_err(|_| ExecutorError::Primitive("account key is not hex".to_string()))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|_| ExecutorError::Primitive("account key is not a valid secret".to_string()))?;
        Ok(Self { secret })
    }

    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// BIP-86 tweaked x-only output key.
    pub fn taproot_output_key(&self) -> Result<[u8; 32], ExecutorError> {
        let signing_key = self.tweaked_signing_key()?;
        Ok(signing_key.verifying_key().to_bytes().into())
    }

    /// Output script this account can spend by key path.
    pub fn taproot_script_pubkey(&self) -> Result<Vec<u8>, ExecutorError> {
        Ok(p2tr_script(&self.taproot_output_key()?))
    }

    /// Secret scalar tweaked with `TapTweak(P)` and no script tree.
    fn tweaked_signing_key(&self) -> Result<schnorr::SigningKey, ExecutorError> {
        let public = self.secret.public_key();
        let point = public.as_affine();
        let internal_x = point.x();

        let secret = *self.secret.to_nonzero_scalar();
        let even_secret = if bool::from(point.y_is_odd()) {
            -secret
        } else {
            secret
        };

        let tweak_bytes = tagged_hash("TapTweak", &[internal_x.as_slice()]);
        let tweak = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(tweak_bytes)))
            .ok_or_else(|| ExecutorError::Primitive("taproot tweak out of range".to_string()))?;

        schnorr::SigningKey::from_bytes(&(even_secret + tweak).to_bytes())
            .map_err(|_| ExecutorError::Primitive("tweaked key is invalid".to_string()))
    }

    fn cipher_for(&self, peer: &PublicKey) -> Result<Aes256Gcm, ExecutorError> {
        let shared = k256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared.raw_secret_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(HKDF_INFO, &mut key)
            .map_err(|e| ExecutorError::Primitive(format!("key derivation failed: {e}")))?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
    }
}

#[async_trait]
impl AccountKeys for LocalKeyring {
    fn public_key(&self) -> String {
        hex::encode(self.secret.public_key().to_encoded_point(true).as_bytes())
    }

    async fn sign_message(&self, message: &str) -> Result<String, ExecutorError> {
        let signing_key = ecdsa::SigningKey::from(&self.secret);
        let signature: ecdsa::Signature = signing_key
            .try_sign(message.as_bytes())
            .map_err(|e| ExecutorError::Primitive(format!("signing failed: {e}")))?;
        Ok(hex::encode(signature.to_bytes()))
    }

    async fn encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String, ExecutorError> {
        let cipher = self.cipher_for(peer)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| ExecutorError::Primitive("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    async fn decrypt(&self, peer: &PublicKey, ciphertext: &str) -> Result<String, ExecutorError> {
        let data = BASE64
            .decode(ciphertext.trim())
            .map_err(|_| ExecutorError::Primitive("ciphertext is not base64".to_string()))?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(ExecutorError::Primitive("ciphertext too short".to_string()));
        }

        let (nonce, body) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher_for(peer)?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| ExecutorError::Primitive("decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| ExecutorError::Primitive("plaintext is not UTF-8".to_string()))
    }

    async fn sign_transaction(&self, psbt: &mut Psbt) -> Result<usize, ExecutorError> {
        let signing_key = self.tweaked_signing_key()?;
        let own_script = p2tr_script(&signing_key.verifying_key().to_bytes().into());

        let mut signed = 0;
        for index in 0..psbt.inputs.len() {
            if psbt.inputs[index].is_finalized() {
                continue;
            }
            match psbt.spent_output(index) {
                Ok(spent) if spent.script_pubkey == own_script => {}
                _ => continue,
            }

            let sighash = taproot_key_spend_sighash(psbt, index)?;
            let signature: schnorr::Signature = signing_key
                .sign_prehash(&sighash.digest)
                .map_err(|e| ExecutorError::Primitive(format!("schnorr signing failed: {e}")))?;

            let mut bytes = signature.to_bytes().to_vec();
            if sighash.needs_suffix() {
                bytes.push(sighash.hash_type);
            }
            psbt.inputs[index].tap_key_sig = Some(bytes);
            signed += 1;
        }

        tracing::debug!(signed, inputs = psbt.inputs.len(), "Signed taproot inputs");
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;

    use super::*;
    use crate::psbt::{OutPoint, Transaction, TxIn, TxOut};

    fn keyring(byte: u8) -> LocalKeyring {
        LocalKeyring::from_secret(&SecretString::from(hex::encode([byte; 32]))).unwrap()
    }

    fn peer_of(keys: &LocalKeyring) -> PublicKey {
        keys.secret.public_key()
    }

    #[tokio::test]
    async fn message_signature_verifies() {
        let keys = keyring(7);
        let signature = keys.sign_message("hello").await.unwrap();

        let bytes = hex::decode(signature).unwrap();
        let signature = ecdsa::Signature::from_slice(&bytes).unwrap();
        let verifying_key = ecdsa::VerifyingKey::from(&keys.secret.public_key());
        assert!(verifying_key.verify(b"hello", &signature).is_ok());
    }

    #[tokio::test]
    async fn encryption_is_symmetric_between_peers() {
        let alice = keyring(1);
        let bob = keyring(2);

        let ciphertext = alice.encrypt(&peer_of(&bob), "gm").await.unwrap();
        assert_ne!(ciphertext, "gm");
        assert_eq!(bob.decrypt(&peer_of(&alice), &ciphertext).await.unwrap(), "gm");

        let carol = keyring(3);
        assert!(carol.decrypt(&peer_of(&alice), &ciphertext).await.is_err());
    }

    #[tokio::test]
    async fn decrypt_rejects_short_input() {
        let keys = keyring(4);
        let err = keys.decrypt(&peer_of(&keys), "AAAA").await.unwrap_err();
        assert_eq!(err, ExecutorError::Primitive("ciphertext too short".to_string()));
    }

    #[test]
    fn rejects_invalid_account_key() {
        assert!(LocalKeyring::from_secret(&SecretString::from("zz".to_string())).is_err());
        assert!(LocalKeyring::from_secret(&SecretString::from(hex::encode([0u8; 32]))).is_err());
    }

    #[tokio::test]
    async fn signs_owned_taproot_inputs_only() {
        let keys = keyring(9);
        let own_script = keys.taproot_script_pubkey().unwrap();

        let txin = |vout| TxIn {
            previous_output: OutPoint {
                txid: [2u8; 32],
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
                value: 1_000,
                script_pubkey: own_script.clone(),
            }],
            lock_time: 0,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: 800,
            script_pubkey: own_script,
        });
        psbt.inputs[1].witness_utxo = Some(TxOut {
            value: 800,
            script_pubkey: p2tr_script(&[0x11; 32]),
        });

        assert_eq!(keys.sign_transaction(&mut psbt).await.unwrap(), 1);
        assert!(psbt.inputs[1].tap_key_sig.is_none());

        let signature = psbt.inputs[0].tap_key_sig.clone().unwrap();
        let sighash = taproot_key_spend_sighash(&psbt, 0).unwrap();
        let output_key = keys.taproot_output_key().unwrap();
        let verifying_key = schnorr::VerifyingKey::from_bytes(&output_key).unwrap();
        let signature = schnorr::Signature::try_from(signature.as_slice()).unwrap();
        assert!(verifying_key.verify_prehash(&sighash.digest, &signature).is_ok());
    }
}
