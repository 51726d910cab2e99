use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{decode_fixed_hex, poseidon_pair, sha256, short_hex, HASH_LENGTH};
use crate::secret::{Secret, SECRET_LENGTH};

/// Length of a commitment in bytes
pub const COMMITMENT_LENGTH: usize = HASH_LENGTH;

/// Smallest accepted deposit in base units (5 ADA)
pub const MIN_DEPOSIT: u64 = 5_000_000;

/// Largest accepted deposit in base units (1,000,000 ADA)
pub const MAX_DEPOSIT: u64 = 1_000_000_000_000;

/// Public identifier of a deposit.
///
/// Binds a secret and an amount without revealing either. It is what the
/// pool datum, winner selection and withdrawal authorization refer to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Commitment([u8; COMMITMENT_LENGTH]);

impl Commitment {
    pub fn from_bytes(bytes: [u8; COMMITMENT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CommitmentError> {
        let array: [u8; COMMITMENT_LENGTH] = bytes
            .try_into()
            .map_err(|_| CommitmentError::InvalidCommitmentLength { got: bytes.len() })?;
        Ok(Self(array))
    }

    pub fn from_hex(input: &str) -> Result<Self, CommitmentError> {
        decode_fixed_hex::<COMMITMENT_LENGTH>(input)
            .map(Self)
            .map_err(|e| CommitmentError::InvalidHex(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LENGTH] {
        &self.0
    }

    /// Full lowercase hex form, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for logs and metadata.
    pub fn short(&self) -> String {
        short_hex(&self.0)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({}...)", self.short())
    }
}

impl FromStr for Commitment {
    type Err = CommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Hash construction used to build a commitment.
///
/// `Sha256V1` is the reference construction. `PoseidonBn254` is the
/// circuit-friendly replacement a real proving backend would constrain;
/// both take the same `(secret, amount)` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitmentScheme {
    #[default]
    Sha256V1,
    PoseidonBn254,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("secret must be {SECRET_LENGTH} bytes, got {got}")]
    InvalidSecretLength { got: usize },

    #[error("commitment must be {COMMITMENT_LENGTH} bytes, got {got}")]
    InvalidCommitmentLength { got: usize },

    #[error("invalid commitment hex: {0}")]
    InvalidHex(String),

    #[error("poseidon hash failed: {0}")]
    Hash(String),

    #[error("deposit of {amount} is outside [{MIN_DEPOSIT}, {MAX_DEPOSIT}]")]
    AmountOutOfRange { amount: u64 },
}

/// Reject deposit amounts outside [`MIN_DEPOSIT`]..=[`MAX_DEPOSIT`].
pub fn check_deposit_amount(amount: u64) -> Result<(), CommitmentError> {
    if (MIN_DEPOSIT..=MAX_DEPOSIT).contains(&amount) {
        Ok(())
    } else {
        Err(CommitmentError::AmountOutOfRange { amount })
    }
}

/// Compute the commitment for a deposit
///
/// `SHA-256(secret ‖ amount_be8)`, the reference construction.
///
/// # Arguments
/// * `secret` - 32-byte deposit secret
/// * `amount` - Deposit amount in base units
///
/// # Returns
/// * The commitment, or `InvalidSecretLength` if `secret` is not 32 bytes
pub fn commit(secret: &[u8], amount: u64) -> Result<Commitment, CommitmentError> {
    commit_with(CommitmentScheme::Sha256V1, secret, amount)
}

/// Compute the commitment for a deposit with an explicit hash scheme
pub fn commit_with(
    scheme: CommitmentScheme,
    secret: &[u8],
    amount: u64,
) -> Result<Commitment, CommitmentError> {
    let secret: &[u8; SECRET_LENGTH] = secret
        .try_into()
        .map_err(|_| CommitmentError::InvalidSecretLength { got: secret.len() })?;

    match scheme {
        CommitmentScheme::Sha256V1 => Ok(sha256_commitment(secret, amount)),
        CommitmentScheme::PoseidonBn254 => {
            // Amount occupies the low 8 bytes of a 32-byte big-endian word
            let mut amount_word = [0u8; HASH_LENGTH];
            amount_word[HASH_LENGTH - 8..].copy_from_slice(&amount.to_be_bytes());
            poseidon_pair(secret, &amount_word)
                .map(Commitment)
                .map_err(|e| CommitmentError::Hash(e.to_string()))
        }
    }
}

fn sha256_commitment(secret: &[u8; SECRET_LENGTH], amount: u64) -> Commitment {
    Commitment(sha256(&[secret, &amount.to_be_bytes()]))
}

impl Secret {
    /// Reference commitment for this secret and `amount`.
    pub fn commitment(&self, amount: u64) -> Commitment {
        sha256_commitment(self.as_bytes(), amount)
    }
}
