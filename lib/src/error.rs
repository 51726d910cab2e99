use serde::Serialize;
use std::fmt;

use crate::commitment::CommitmentError;
use crate::datum::DatumError;
use crate::proof::ProofError;
use crate::reconcile::ReconcileError;
use crate::secret::SecretError;
use crate::settlement::SettlementError;

/// Coarse classification callers use to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Malformed secret, commitment, proof or amount
    InputValidation,
    /// Declined signature, or a secret that does not open its commitment
    Authorization,
    /// Operation attempted outside its pool status
    Phase,
    /// Commitment already withdrew
    Replay,
    /// No usable pool state
    Reconciliation,
    /// Wallet, indexer or proving service unreachable
    ExternalDependency,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::InputValidation => "input-validation",
            ErrorClass::Authorization => "authorization",
            ErrorClass::Phase => "phase",
            ErrorClass::Replay => "replay",
            ErrorClass::Reconciliation => "reconciliation",
            ErrorClass::ExternalDependency => "external-dependency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Commitment(#[from] CommitmentError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Datum(#[from] DatumError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl ProtocolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolError::Secret(e) => match e {
                SecretError::SigningDeclined | SecretError::NondeterministicSigner => {
                    ErrorClass::Authorization
                }
                SecretError::SignerUnavailable(_) | SecretError::EmptySignature => {
                    ErrorClass::ExternalDependency
                }
                SecretError::InvalidSecretLength { .. } | SecretError::InvalidEncoding => {
                    ErrorClass::InputValidation
                }
            },
            ProtocolError::Commitment(_) => ErrorClass::InputValidation,
            ProtocolError::Proof(e) => match e {
                ProofError::CommitmentMismatch
                | ProofError::RoleMismatch { .. }
                | ProofError::VerificationFailed => ErrorClass::Authorization,
                ProofError::Backend(_) => ErrorClass::ExternalDependency,
                ProofError::InvalidProofLength { .. }
                | ProofError::UnknownRoleTag(_)
                | ProofError::UnknownRole(_)
                | ProofError::InvalidEncoding(_) => ErrorClass::InputValidation,
            },
            ProtocolError::Datum(_) | ProtocolError::Reconcile(_) => ErrorClass::Reconciliation,
            ProtocolError::Settlement(e) => match e {
                SettlementError::AlreadyWithdrawn(_) => ErrorClass::Replay,
                SettlementError::WrongPhase { .. } => ErrorClass::Phase,
                SettlementError::NotWithdrawalRole(_) | SettlementError::RoleMismatch { .. } => {
                    ErrorClass::Authorization
                }
                SettlementError::PayoutOverflow { .. } => ErrorClass::InputValidation,
                SettlementError::NoAuthoritativeRecord => ErrorClass::Reconciliation,
            },
        }
    }

    /// Failures that retrying with the same inputs cannot fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::InputValidation | ErrorClass::Replay | ErrorClass::Authorization
        )
    }
}
