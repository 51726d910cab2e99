//! Withdrawal settlement and replay protection.

use std::collections::HashSet;

use tracing::info;

use crate::commitment::Commitment;
use crate::datum::{PoolDatum, PoolStatus};
use crate::proof::{resolve_role, Role};
use crate::reconcile::{PoolState, Reconciliation};

/// Commitments that have already withdrawn this epoch.
///
/// Insertion order is kept so the set maps back onto the datum's
/// `withdrawn_commitments` list unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawnSet {
    ordered: Vec<Commitment>,
    index: HashSet<Commitment>,
}

impl WithdrawnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_datum(datum: &PoolDatum) -> Self {
        let mut set = Self::new();
        for commitment in &datum.withdrawn_commitments {
            set.insert(*commitment);
        }
        set
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.index.contains(commitment)
    }

    /// Returns `false` if the commitment was already present.
    pub fn insert(&mut self, commitment: Commitment) -> bool {
        if !self.index.insert(commitment) {
            return false;
        }
        self.ordered.push(commitment);
        true
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Commitment> {
        self.ordered.iter()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("commitment {0} has already withdrawn")]
    AlreadyWithdrawn(Commitment),

    #[error("pool is {status}; withdrawals open once distribution starts")]
    WrongPhase { status: PoolStatus },

    #[error("role {0} cannot withdraw")]
    NotWithdrawalRole(Role),

    #[error("claimed role {claimed} but the commitment resolves to {resolved}")]
    RoleMismatch { claimed: Role, resolved: Role },

    #[error("payout overflows: share {share} plus yield {yield_amount}")]
    PayoutOverflow { share: u64, yield_amount: u64 },

    #[error("no on-chain record backs this pool state; refusing to authorize withdrawal")]
    NoAuthoritativeRecord,
}

/// Equal share of the principal. An empty pool pays nothing.
pub fn per_participant_share(state: &PoolState) -> u64 {
    if state.participant_count == 0 {
        return 0;
    }
    state.total_deposited / state.participant_count
}

/// Settle one withdrawal against `state`, recording it in `withdrawn`.
///
/// Checks run replay first, then phase, then role, so a commitment that
/// already withdrew is always reported as such. An empty pool pays 0 once
/// replay and phase pass. Otherwise the amount is the equal share, plus the
/// reconciled yield for the winner. Nothing is recorded when an error is
/// returned.
pub fn settle(
    commitment: &Commitment,
    role: Role,
    state: &PoolState,
    withdrawn: &mut WithdrawnSet,
) -> Result<u64, SettlementError> {
    let payout = quote(commitment, role, state, withdrawn)?;
    withdrawn.insert(*commitment);
    info!(commitment = %commitment.short(), %role, payout, "settled withdrawal");
    Ok(payout)
}

/// The checks and payout of [`settle`] without recording anything.
pub fn quote(
    commitment: &Commitment,
    role: Role,
    state: &PoolState,
    withdrawn: &WithdrawnSet,
) -> Result<u64, SettlementError> {
    if withdrawn.contains(commitment) {
        return Err(SettlementError::AlreadyWithdrawn(*commitment));
    }
    if !state.status.accepts_withdrawals() {
        return Err(SettlementError::WrongPhase {
            status: state.status,
        });
    }
    // An empty pool pays nothing, whatever the claimed role
    if state.participant_count == 0 {
        return Ok(0);
    }
    if !role.is_withdrawal() {
        return Err(SettlementError::NotWithdrawalRole(role));
    }
    let resolved = resolve_role(commitment, state.winner_commitment.as_ref());
    if resolved != role {
        return Err(SettlementError::RoleMismatch {
            claimed: role,
            resolved,
        });
    }

    let share = per_participant_share(state);
    match role {
        Role::Winner => {
            let yield_amount = state.yield_amount;
            share
                .checked_add(yield_amount)
                .ok_or(SettlementError::PayoutOverflow {
                    share,
                    yield_amount,
                })
        }
        _ => Ok(share),
    }
}

/// A withdrawal that passed every check, ready to be proven and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPlan {
    pub commitment: Commitment,
    pub role: Role,
    pub payout: u64,
    pub next_datum: PoolDatum,
}

/// Authorize a withdrawal against a fresh reconciliation.
///
/// The replay guard is re-derived from the datum on every call; without a
/// datum there is no authoritative withdrawn set and the request is refused.
pub fn authorize_withdrawal(
    commitment: &Commitment,
    role: Role,
    reconciliation: &Reconciliation,
) -> Result<WithdrawalPlan, SettlementError> {
    let datum = reconciliation
        .datum
        .as_ref()
        .ok_or(SettlementError::NoAuthoritativeRecord)?;
    let mut withdrawn = WithdrawnSet::from_datum(datum);

    let payout = settle(commitment, role, &reconciliation.state, &mut withdrawn)?;
    Ok(WithdrawalPlan {
        commitment: *commitment,
        role,
        payout,
        next_datum: datum.record_withdrawal(*commitment, role),
    })
}
