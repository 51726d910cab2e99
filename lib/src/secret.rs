//! Wallet-bound secret derivation.
//!
//! A deposit secret is never stored. It is recomputed on demand as
//! `SHA-256(signature)` where the signature is produced by the participant's
//! wallet over a canonical message naming the epoch and the amount. Signing
//! the same message with the same key must give the same signature, which is
//! what makes a withdrawal possible without a persisted note file.

use std::fmt;

use crate::crypto::{constant_time_eq, sha256};

/// Length of a derived secret in bytes
pub const SECRET_LENGTH: usize = 32;

/// A 32-byte deposit secret.
///
/// `Debug` is redacted; use [`Secret::to_hex`] only when the value has to
/// leave the process (for example towards a proving service).
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LENGTH]);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SecretError> {
        let array: [u8; SECRET_LENGTH] = bytes
            .try_into()
            .map_err(|_| SecretError::InvalidSecretLength { got: bytes.len() })?;
        Ok(Self(array))
    }

    pub fn from_hex(input: &str) -> Result<Self, SecretError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed).map_err(|_| SecretError::InvalidEncoding)?;
        Self::from_slice(&bytes)
    }

    /// Hash a wallet signature into a secret.
    pub fn from_signature(signature: &[u8]) -> Self {
        Self(sha256(&[signature]))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Errors raised while deriving or loading a secret
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("signature request was declined")]
    SigningDeclined,

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("signer returned an empty signature")]
    EmptySignature,

    #[error("signer is not deterministic; identical messages produced different signatures")]
    NondeterministicSigner,

    #[error("secret must be {SECRET_LENGTH} bytes, got {got}")]
    InvalidSecretLength { got: usize },

    #[error("secret is not valid hex")]
    InvalidEncoding,
}

/// Narrow signing capability a wallet bridge exposes to secret derivation.
#[allow(async_fn_in_trait)]
pub trait SigningCapability {
    /// Address the signature is produced for, as the wallet renders it.
    fn address(&self) -> String;

    /// Sign `message` exactly as given. Cancellation by the user must map to
    /// [`SecretError::SigningDeclined`].
    async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SecretError>;
}

/// Canonical message a participant signs to derive the secret for one
/// deposit.
pub fn canonical_message(epoch_id: u64, amount: u64) -> String {
    format!(
        "Deposit Authorization\n\
         Epoch: {epoch_id}\n\
         Amount: {amount} base-units\n\
         Purpose: derive the private secret for this deposit (veilpot v1)\n\
         Signing does not move funds. Never share this signature."
    )
}

/// Derive the secret for `(epoch_id, amount)` from one wallet signature.
///
/// No state is produced when signing fails.
pub async fn derive_secret<S: SigningCapability>(
    signer: &S,
    epoch_id: u64,
    amount: u64,
) -> Result<Secret, SecretError> {
    let message = canonical_message(epoch_id, amount);
    let signature = signer.sign_message(&message).await?;
    if signature.is_empty() {
        return Err(SecretError::EmptySignature);
    }
    tracing::debug!(epoch_id, amount, "derived deposit secret from wallet signature");
    Ok(Secret::from_signature(&signature))
}

/// Like [`derive_secret`] but signs twice and rejects signers whose output
/// differs between calls. A randomized signer would make the deposit
/// unrecoverable, so callers fall back to a persisted secret on
/// [`SecretError::NondeterministicSigner`].
pub async fn derive_secret_checked<S: SigningCapability>(
    signer: &S,
    epoch_id: u64,
    amount: u64,
) -> Result<Secret, SecretError> {
    let message = canonical_message(epoch_id, amount);
    let first = signer.sign_message(&message).await?;
    let second = signer.sign_message(&message).await?;
    if first.is_empty() || second.is_empty() {
        return Err(SecretError::EmptySignature);
    }
    if !constant_time_eq(&first, &second) {
        tracing::warn!(address = %signer.address(), "wallet produced randomized signatures");
        return Err(SecretError::NondeterministicSigner);
    }
    Ok(Secret::from_signature(&first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic test signer: signature = SHA-256(key ‖ message)
    struct FixedKeySigner {
        key: [u8; 32],
    }

    impl SigningCapability for FixedKeySigner {
        fn address(&self) -> String {
            "addr_test_fixed".to_string()
        }

        async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SecretError> {
            Ok(sha256(&[&self.key, message.as_bytes()]).to_vec())
        }
    }

    /// Signer that mixes a counter into every signature
    struct RandomizedSigner {
        counter: AtomicU64,
    }

    impl SigningCapability for RandomizedSigner {
        fn address(&self) -> String {
            "addr_test_random".to_string()
        }

        async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SecretError> {
            let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(sha256(&[message.as_bytes(), &nonce.to_be_bytes()]).to_vec())
        }
    }

    struct DecliningSigner;

    impl SigningCapability for DecliningSigner {
        fn address(&self) -> String {
            "addr_test_declines".to_string()
        }

        async fn sign_message(&self, _message: &str) -> Result<Vec<u8>, SecretError> {
            Err(SecretError::SigningDeclined)
        }
    }

    #[test]
    fn test_canonical_message_layout() {
        let message = canonical_message(7, 50_000_000);
        assert!(message.starts_with("Deposit Authorization\nEpoch: 7\nAmount: 50000000 base-units\n"));
        assert_ne!(message, canonical_message(8, 50_000_000));
        assert_ne!(message, canonical_message(7, 50_000_001));
    }

    #[tokio::test]
    async fn test_derive_secret_is_reproducible() {
        let signer = FixedKeySigner { key: [3u8; 32] };
        let first = derive_secret(&signer, 7, 50_000_000).await.unwrap();
        let second = derive_secret(&signer, 7, 50_000_000).await.unwrap();
        assert_eq!(first, second);

        let other_epoch = derive_secret(&signer, 8, 50_000_000).await.unwrap();
        assert_ne!(first, other_epoch);
    }

    #[tokio::test]
    async fn test_derive_secret_declined() {
        let result = derive_secret(&DecliningSigner, 1, 10_000_000).await;
        assert_eq!(result.unwrap_err(), SecretError::SigningDeclined);
    }

    #[tokio::test]
    async fn test_checked_derivation_rejects_randomized_signer() {
        let signer = RandomizedSigner {
            counter: AtomicU64::new(0),
        };
        let result = derive_secret_checked(&signer, 1, 10_000_000).await;
        assert_eq!(result.unwrap_err(), SecretError::NondeterministicSigner);
    }

    #[tokio::test]
    async fn test_checked_derivation_matches_plain_derivation() {
        let signer = FixedKeySigner { key: [5u8; 32] };
        let checked = derive_secret_checked(&signer, 2, 20_000_000).await.unwrap();
        let plain = derive_secret(&signer, 2, 20_000_000).await.unwrap();
        assert_eq!(checked, plain);
    }

    #[test]
    fn test_secret_length_validation() {
        assert!(Secret::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(
            Secret::from_slice(&[0u8; 31]).unwrap_err(),
            SecretError::InvalidSecretLength { got: 31 }
        );
        assert_eq!(
            Secret::from_hex("zz").unwrap_err(),
            SecretError::InvalidEncoding
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from_bytes([0xaa; 32]);
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("aa"));
    }
}
