pub mod commitment;
pub mod crypto;
pub mod datum;
pub mod error;
pub mod proof;
pub mod reconcile;
pub mod secret;
pub mod settlement;

// Re-export the protocol surface for convenience
pub use commitment::{commit, commit_with, Commitment, CommitmentError, CommitmentScheme};
pub use datum::{DatumError, PoolDatum, PoolStatus};
pub use error::{ErrorClass, ProtocolError};
pub use proof::{
    resolve_role, verify, Claim, LocalProver, Proof, ProofBackend, ProofContext, ProofError,
    ProofMetadata, ProofRequest, Role, RoundRoot, RoundRootStatus,
};
pub use reconcile::{
    merge, reconcile, ChainSnapshot, PoolState, Reconciliation, ReconcileError, StateSource,
};
pub use secret::{derive_secret, derive_secret_checked, Secret, SecretError, SigningCapability};
pub use settlement::{authorize_withdrawal, settle, SettlementError, WithdrawalPlan, WithdrawnSet};
