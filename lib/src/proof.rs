//! Deposit, winner and loser proofs.
//!
//! Stand-in construction, 64 bytes:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       32    commitment
//! 32      1     role tag
//! 33      31    SHA-256(commitment ‖ round_root)[0..31]
//! ```
//!
//! A verifier holding the round root recomputes the last field without
//! learning the secret. A circuit-backed prover plugs in behind
//! [`ProofBackend`] and must satisfy the same [`verify`] contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::commitment::{Commitment, COMMITMENT_LENGTH};
use crate::crypto::{constant_time_eq, decode_fixed_hex, sha256, short_hex, HASH_LENGTH};
use crate::secret::Secret;

/// Total proof length in bytes
pub const PROOF_LENGTH: usize = 64;

/// Length of the round-bound signature field
pub const SIGNATURE_LENGTH: usize = 31;

const ROLE_OFFSET: usize = COMMITMENT_LENGTH;
const SIGNATURE_OFFSET: usize = COMMITMENT_LENGTH + 1;

/// Transaction metadata label proofs are published under
pub const METADATA_LABEL: u64 = 674;

/// Domain separator for locally derived round roots
const ROUND_ROOT_DOMAIN: &[u8] = b"veilpot.round-root.v1";

/// What a proof claims about its commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Deposit,
    Winner,
    Loser,
}

impl Role {
    pub const fn tag(self) -> u8 {
        match self {
            Role::Deposit => 0,
            Role::Winner => 1,
            Role::Loser => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, ProofError> {
        match tag {
            0 => Ok(Role::Deposit),
            1 => Ok(Role::Winner),
            2 => Ok(Role::Loser),
            other => Err(ProofError::UnknownRoleTag(other)),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Deposit => "deposit",
            Role::Winner => "winner",
            Role::Loser => "loser",
        }
    }

    pub const fn is_withdrawal(self) -> bool {
        matches!(self, Role::Winner | Role::Loser)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Role::Deposit),
            "winner" => Ok(Role::Winner),
            "loser" => Ok(Role::Loser),
            other => Err(ProofError::UnknownRole(other.to_string())),
        }
    }
}

/// Per-round public value proofs are bound to, so a proof from one round
/// does not verify in another.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundRoot([u8; HASH_LENGTH]);

impl RoundRoot {
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(input: &str) -> Result<Self, ProofError> {
        decode_fixed_hex::<HASH_LENGTH>(input)
            .map(Self)
            .map_err(|e| ProofError::InvalidEncoding(e.to_string()))
    }

    /// Round root an administrator would publish when opening `epoch_id`.
    pub fn derive(epoch_id: u64, admin_key_hash: &[u8]) -> Self {
        Self(sha256(&[
            ROUND_ROOT_DOMAIN,
            &epoch_id.to_be_bytes(),
            admin_key_hash,
        ]))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RoundRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoundRoot({}...)", short_hex(&self.0))
    }
}

/// Where the round root used for a proof came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundRootStatus {
    /// Read from the reconciled on-chain datum
    OnChain,
    /// Derived locally because no datum was available
    Derived,
}

/// Public inputs carried by every proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicInputs {
    pub commitment: Commitment,
    pub role: Role,
}

/// A fixed-length proof plus its parsed public inputs.
#[derive(Clone, PartialEq, Eq)]
pub struct Proof {
    bytes: [u8; PROOF_LENGTH],
    public_inputs: PublicInputs,
}

impl Proof {
    /// Build the stand-in proof for `commitment` in `role`, bound to
    /// `round_root`.
    pub fn assemble(commitment: Commitment, role: Role, round_root: &RoundRoot) -> Self {
        let mut bytes = [0u8; PROOF_LENGTH];
        bytes[..COMMITMENT_LENGTH].copy_from_slice(commitment.as_bytes());
        bytes[ROLE_OFFSET] = role.tag();
        bytes[SIGNATURE_OFFSET..].copy_from_slice(&binding_signature(&commitment, round_root));

        Self {
            bytes,
            public_inputs: PublicInputs { commitment, role },
        }
    }

    /// Parse proof bytes, e.g. as returned by a proving service.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let bytes: [u8; PROOF_LENGTH] = bytes
            .try_into()
            .map_err(|_| ProofError::InvalidProofLength { got: bytes.len() })?;

        let commitment = Commitment::from_slice(&bytes[..COMMITMENT_LENGTH])
            .map_err(|e| ProofError::InvalidEncoding(e.to_string()))?;
        let role = Role::from_tag(bytes[ROLE_OFFSET])?;

        Ok(Self {
            bytes,
            public_inputs: PublicInputs { commitment, role },
        })
    }

    pub fn from_hex(input: &str) -> Result<Self, ProofError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed).map_err(|e| ProofError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PROOF_LENGTH] {
        &self.bytes
    }

    pub fn public_inputs(&self) -> PublicInputs {
        self.public_inputs
    }

    pub fn commitment(&self) -> Commitment {
        self.public_inputs.commitment
    }

    pub fn role(&self) -> Role {
        self.public_inputs.role
    }

    /// The round-bound signature field.
    pub fn signature(&self) -> &[u8] {
        &self.bytes[SIGNATURE_OFFSET..]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proof")
            .field("commitment", &self.public_inputs.commitment)
            .field("role", &self.public_inputs.role)
            .field("prefix", &short_hex(&self.bytes))
            .finish()
    }
}

/// `SHA-256(commitment ‖ round_root)[0..31]`
pub fn binding_signature(commitment: &Commitment, round_root: &RoundRoot) -> [u8; SIGNATURE_LENGTH] {
    let digest = sha256(&[commitment.as_bytes(), round_root.as_bytes()]);
    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature.copy_from_slice(&digest[..SIGNATURE_LENGTH]);
    signature
}

/// Check a proof against the round root it claims to be bound to.
///
/// Comparison is constant time so partial matches are not observable.
pub fn verify(proof: &Proof, round_root: &RoundRoot) -> bool {
    let expected = binding_signature(&proof.commitment(), round_root);
    constant_time_eq(proof.signature(), &expected)
}

/// Winner/loser branch. The winner commitment must come from the
/// reconciled pool state, never from a local cache.
pub fn resolve_role(my_commitment: &Commitment, winner_commitment: Option<&Commitment>) -> Role {
    match winner_commitment {
        Some(winner) if constant_time_eq(my_commitment.as_bytes(), winner.as_bytes()) => Role::Winner,
        _ => Role::Loser,
    }
}

/// Role-specific input to a proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Deposit {
        amount: u64,
    },
    Withdrawal {
        amount: u64,
        winner_commitment: Option<Commitment>,
    },
}

impl Claim {
    pub fn amount(&self) -> u64 {
        match *self {
            Claim::Deposit { amount } | Claim::Withdrawal { amount, .. } => amount,
        }
    }
}

/// Everything besides the secret and commitment a prover needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofContext {
    pub round_root: RoundRoot,
    pub claim: Claim,
}

/// One proof request, identical for every backend.
#[derive(Debug, Clone)]
pub struct ProofRequest<'a> {
    pub role: Role,
    pub secret: &'a Secret,
    pub commitment: Commitment,
    pub context: ProofContext,
}

impl ProofRequest<'_> {
    /// Reject requests no honest prover should answer: the secret must open
    /// the commitment and the role must match the claim.
    pub fn check(&self) -> Result<(), ProofError> {
        let opened = self.secret.commitment(self.context.claim.amount());
        if !constant_time_eq(opened.as_bytes(), self.commitment.as_bytes()) {
            return Err(ProofError::CommitmentMismatch);
        }

        let expected = match self.context.claim {
            Claim::Deposit { .. } => Role::Deposit,
            Claim::Withdrawal {
                winner_commitment, ..
            } => resolve_role(&self.commitment, winner_commitment.as_ref()),
        };
        if self.role != expected {
            return Err(ProofError::RoleMismatch {
                claimed: self.role,
                resolved: expected,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof must be {PROOF_LENGTH} bytes, got {got}")]
    InvalidProofLength { got: usize },

    #[error("unknown role tag {0}")]
    UnknownRoleTag(u8),

    #[error("unknown role {0:?}")]
    UnknownRole(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("secret does not open the commitment")]
    CommitmentMismatch,

    #[error("claimed role {claimed} but the commitment resolves to {resolved}")]
    RoleMismatch { claimed: Role, resolved: Role },

    #[error("proof does not verify against the round root")]
    VerificationFailed,

    #[error("proving backend failed: {0}")]
    Backend(String),
}

/// A proving backend. The simulated construction and a circuit-backed
/// prover implement the same contract, so either can be dropped in.
#[allow(async_fn_in_trait)]
pub trait ProofBackend {
    fn name(&self) -> &'static str;

    async fn prove(&self, request: &ProofRequest<'_>) -> Result<Proof, ProofError>;
}

/// Deterministic hash-based construction, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProver;

impl LocalProver {
    pub fn prove_sync(&self, request: &ProofRequest<'_>) -> Result<Proof, ProofError> {
        request.check()?;
        Ok(Proof::assemble(
            request.commitment,
            request.role,
            &request.context.round_root,
        ))
    }
}

impl ProofBackend for LocalProver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prove(&self, request: &ProofRequest<'_>) -> Result<Proof, ProofError> {
        self.prove_sync(request)
    }
}

/// Auditable summary attached to a settlement transaction.
///
/// Fields are abbreviated; the full proof is re-verified from the
/// commitment and round root, never from this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub commitment: String,
    pub epoch: u64,
    pub role: Role,
    pub proof_prefix: String,
    pub round_root_status: RoundRootStatus,
}

impl ProofMetadata {
    pub fn new(proof: &Proof, epoch: u64, round_root_status: RoundRootStatus) -> Self {
        Self {
            commitment: proof.commitment().short(),
            epoch,
            role: proof.role(),
            proof_prefix: short_hex(proof.as_bytes()),
            round_root_status,
        }
    }

    /// Metadata document keyed by [`METADATA_LABEL`].
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut document = serde_json::Map::new();
        document.insert(METADATA_LABEL.to_string(), serde_json::to_value(self)?);
        Ok(serde_json::Value::Object(document))
    }
}
