//! Cryptographic utilities for Veilpot
//!
//! This module provides the hash constructions used by the commitment and
//! proof engines: SHA-256 for the reference construction, Poseidon over
//! BN254 for the circuit-friendly variant, and constant-time comparison.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonBytesHasher, PoseidonError};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash length in bytes (32 bytes for both SHA-256 and Poseidon)
pub const HASH_LENGTH: usize = 32;

/// Number of bytes shown when abbreviating hashes for logs and metadata
pub const SHORT_HEX_BYTES: usize = 8;

/// Compute SHA-256 over the concatenation of `parts`
///
/// Feeding the parts one by one is equivalent to hashing `a ‖ b ‖ ...`
/// without allocating the concatenated buffer.
///
/// # Arguments
/// * `parts` - Byte slices to hash, in order
///
/// # Returns
/// * 32-byte digest
pub fn sha256(parts: &[&[u8]]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Compute Poseidon hash of two 32-byte big-endian inputs
///
/// Both inputs are reduced into the BN254 scalar field first, so any
/// 32-byte value is accepted. Uses the circom parameter set, matching
/// what a Groth16 circuit over BN254 would compute.
///
/// # Arguments
/// * `left` - Left input, big-endian
/// * `right` - Right input, big-endian
///
/// # Returns
/// * Poseidon hash as 32 big-endian bytes
pub fn poseidon_pair(
    left: &[u8; HASH_LENGTH],
    right: &[u8; HASH_LENGTH],
) -> Result<[u8; HASH_LENGTH], PoseidonError> {
    let left_bytes = Fr::from_be_bytes_mod_order(left).into_bigint().to_bytes_be();
    let right_bytes = Fr::from_be_bytes_mod_order(right)
        .into_bigint()
        .to_bytes_be();

    let mut poseidon = Poseidon::<Fr>::new_circom(2)?;
    poseidon.hash_bytes_be(&[left_bytes.as_slice(), right_bytes.as_slice()])
}

/// Constant-time byte slice comparison
///
/// Used wherever a secret-dependent value (proof signature, commitment
/// ownership) is compared, so that a mismatch does not leak the length of
/// the matching prefix through timing.
///
/// # Returns
/// * `true` if both slices have the same length and contents
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Abbreviated hex form of a hash, for logs and transaction metadata
pub fn short_hex(bytes: &[u8]) -> String {
    let end = bytes.len().min(SHORT_HEX_BYTES);
    hex::encode(&bytes[..end])
}

/// Decode exactly `N` bytes from a hex string, accepting an optional `0x`
/// prefix.
pub fn decode_fixed_hex<const N: usize>(input: &str) -> Result<[u8; N], FixedHexError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed)?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| FixedHexError::Length { expected: N, got })
}

/// Failure to decode a fixed-width hex value
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FixedHexError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}
