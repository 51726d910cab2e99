//! On-chain pool datum codec.
//!
//! The datum is an RLP list with a fixed field order:
//!
//! ```text
//! Index  Field                   Encoding
//! -----  -----                   --------
//! 0      admin key hash          28-byte string
//! 1      epoch id                integer
//! 2      epoch end (ms)          integer
//! 3      total deposited         integer
//! 4      participant count       integer
//! 5      round root              32-byte string
//! 6      status tag              integer
//! 7      stake-pool reference    utf-8 string
//! 8      yield amount            integer
//! 9      winner commitment       32-byte string, empty when unset
//! 10     withdrawal count        integer
//! 11     winner-withdrawn flag   integer 0 or 1
//! 12     withdrawn commitments   list of 32-byte strings
//! ```
//!
//! Decoding rejects anything encoding would not have produced, so
//! `encode(decode(b)) == b` for every accepted `b`.

use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::commitment::{Commitment, COMMITMENT_LENGTH};
use crate::crypto::HASH_LENGTH;
use crate::proof::{Role, RoundRoot};

/// Length of the administrator's key hash
pub const KEY_HASH_LENGTH: usize = 28;

/// Number of top-level fields in the encoded datum
pub const DATUM_FIELD_COUNT: usize = 13;

/// Lifecycle of a pool round. Transitions are forward-only and performed
/// by the administrator, never by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolStatus {
    Collecting,
    Staking,
    SelectingWinner,
    Distributing,
    Completed,
}

impl PoolStatus {
    pub const fn tag(self) -> u64 {
        match self {
            PoolStatus::Collecting => 0,
            PoolStatus::Staking => 1,
            PoolStatus::SelectingWinner => 2,
            PoolStatus::Distributing => 3,
            PoolStatus::Completed => 4,
        }
    }

    pub fn from_tag(tag: u64) -> Result<Self, DatumError> {
        match tag {
            0 => Ok(PoolStatus::Collecting),
            1 => Ok(PoolStatus::Staking),
            2 => Ok(PoolStatus::SelectingWinner),
            3 => Ok(PoolStatus::Distributing),
            4 => Ok(PoolStatus::Completed),
            other => Err(DatumError::UnknownStatus(other)),
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PoolStatus) -> bool {
        next > self
    }

    pub fn accepts_deposits(self) -> bool {
        self == PoolStatus::Collecting
    }

    pub fn accepts_withdrawals(self) -> bool {
        self == PoolStatus::Distributing
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolStatus::Collecting => "collecting",
            PoolStatus::Staking => "staking",
            PoolStatus::SelectingWinner => "selecting-winner",
            PoolStatus::Distributing => "distributing",
            PoolStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

impl FromStr for PoolStatus {
    type Err = DatumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collecting" => Ok(PoolStatus::Collecting),
            "staking" => Ok(PoolStatus::Staking),
            "selecting-winner" | "selecting_winner" => Ok(PoolStatus::SelectingWinner),
            "distributing" => Ok(PoolStatus::Distributing),
            "completed" => Ok(PoolStatus::Completed),
            other => Err(DatumError::UnknownStatusName(other.to_string())),
        }
    }
}

/// Authoritative per-epoch pool record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDatum {
    pub admin_key_hash: [u8; KEY_HASH_LENGTH],
    pub epoch_id: u64,
    pub epoch_end_ms: u64,
    pub total_deposited: u64,
    pub participant_count: u64,
    pub round_root: RoundRoot,
    pub status: PoolStatus,
    pub stake_pool: String,
    pub yield_amount: u64,
    pub winner_commitment: Option<Commitment>,
    pub withdrawal_count: u64,
    pub winner_withdrawn: bool,
    pub withdrawn_commitments: Vec<Commitment>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DatumError {
    #[error("rlp decoding failed: {0}")]
    Decode(#[from] DecoderError),

    #[error("datum must be a list of {DATUM_FIELD_COUNT} fields, got {got}")]
    FieldCount { got: usize },

    #[error("field {field} must be {expected} bytes, got {got}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("unknown status tag {0}")]
    UnknownStatus(u64),

    #[error("unknown status {0:?}")]
    UnknownStatusName(String),

    #[error("winner-withdrawn flag must be 0 or 1, got {0}")]
    InvalidFlag(u64),

    #[error("{0} trailing bytes after datum")]
    TrailingBytes(usize),

    #[error("invalid datum hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("withdrawal count {count} does not match {listed} withdrawn commitments")]
    WithdrawalCountMismatch { count: u64, listed: usize },

    #[error("{withdrawals} withdrawals exceed {participants} participants")]
    WithdrawalsExceedParticipants { withdrawals: u64, participants: u64 },

    #[error("commitment {0} withdrawn twice")]
    DuplicateWithdrawal(Commitment),

    #[error("winner marked withdrawn but not in the withdrawn set")]
    WinnerWithdrawnUnrecorded,

    #[error("status {0} requires a winner commitment")]
    MissingWinner(PoolStatus),
}

impl PoolDatum {
    /// Encode to the on-chain byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(DATUM_FIELD_COUNT);
        stream.append(&self.admin_key_hash.as_slice());
        stream.append(&self.epoch_id);
        stream.append(&self.epoch_end_ms);
        stream.append(&self.total_deposited);
        stream.append(&self.participant_count);
        stream.append(&self.round_root.as_bytes().as_slice());
        stream.append(&self.status.tag());
        stream.append(&self.stake_pool.as_bytes());
        stream.append(&self.yield_amount);
        match &self.winner_commitment {
            Some(winner) => stream.append(&winner.as_bytes().as_slice()),
            None => stream.append_empty_data(),
        };
        stream.append(&self.withdrawal_count);
        stream.append(&u64::from(self.winner_withdrawn));

        stream.begin_list(self.withdrawn_commitments.len());
        for commitment in &self.withdrawn_commitments {
            stream.append(&commitment.as_bytes().as_slice());
        }

        stream.out().to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Decode the on-chain byte layout. Does not run [`PoolDatum::validate`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DatumError> {
        let rlp = Rlp::new(bytes);
        if !rlp.is_list() {
            return Err(DatumError::Decode(DecoderError::RlpExpectedToBeList));
        }

        let total = rlp.payload_info()?.total();
        if total != bytes.len() {
            return Err(DatumError::TrailingBytes(bytes.len().saturating_sub(total)));
        }

        let field_count = rlp.item_count()?;
        if field_count != DATUM_FIELD_COUNT {
            return Err(DatumError::FieldCount { got: field_count });
        }

        let admin_key_hash =
            fixed_bytes::<KEY_HASH_LENGTH>(&rlp.val_at::<Vec<u8>>(0)?, "admin key hash")?;
        let round_root = RoundRoot::from_bytes(fixed_bytes::<HASH_LENGTH>(
            &rlp.val_at::<Vec<u8>>(5)?,
            "round root",
        )?);
        let stake_pool = String::from_utf8(rlp.val_at::<Vec<u8>>(7)?)
            .map_err(|_| DatumError::Decode(DecoderError::Custom("stake pool is not utf-8")))?;

        let winner_bytes = rlp.val_at::<Vec<u8>>(9)?;
        let winner_commitment = if winner_bytes.is_empty() {
            None
        } else {
            Some(Commitment::from_bytes(fixed_bytes::<COMMITMENT_LENGTH>(
                &winner_bytes,
                "winner commitment",
            )?))
        };

        let winner_withdrawn = match rlp.val_at::<u64>(11)? {
            0 => false,
            1 => true,
            other => return Err(DatumError::InvalidFlag(other)),
        };

        let withdrawn_commitments = rlp
            .list_at::<Vec<u8>>(12)?
            .iter()
            .map(|bytes| {
                fixed_bytes::<COMMITMENT_LENGTH>(bytes, "withdrawn commitment")
                    .map(Commitment::from_bytes)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            admin_key_hash,
            epoch_id: rlp.val_at(1)?,
            epoch_end_ms: rlp.val_at(2)?,
            total_deposited: rlp.val_at(3)?,
            participant_count: rlp.val_at(4)?,
            round_root,
            status: PoolStatus::from_tag(rlp.val_at(6)?)?,
            stake_pool,
            yield_amount: rlp.val_at(8)?,
            winner_commitment,
            withdrawal_count: rlp.val_at(10)?,
            winner_withdrawn,
            withdrawn_commitments,
        })
    }

    pub fn from_hex(input: &str) -> Result<Self, DatumError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        Self::decode(&hex::decode(trimmed)?)
    }

    /// Internal consistency checks a datum must pass to be authoritative.
    pub fn validate(&self) -> Result<(), DatumError> {
        let listed = self.withdrawn_commitments.len();
        if usize::try_from(self.withdrawal_count).ok() != Some(listed) {
            return Err(DatumError::WithdrawalCountMismatch {
                count: self.withdrawal_count,
                listed,
            });
        }
        if self.withdrawal_count > self.participant_count {
            return Err(DatumError::WithdrawalsExceedParticipants {
                withdrawals: self.withdrawal_count,
                participants: self.participant_count,
            });
        }

        let mut seen = HashSet::with_capacity(listed);
        for commitment in &self.withdrawn_commitments {
            if !seen.insert(commitment) {
                return Err(DatumError::DuplicateWithdrawal(*commitment));
            }
        }

        if self.winner_withdrawn {
            let recorded = self
                .winner_commitment
                .as_ref()
                .is_some_and(|winner| seen.contains(winner));
            if !recorded {
                return Err(DatumError::WinnerWithdrawnUnrecorded);
            }
        }

        let needs_winner = matches!(
            self.status,
            PoolStatus::Distributing | PoolStatus::Completed
        ) && self.participant_count > 0;
        if needs_winner && self.winner_commitment.is_none() {
            return Err(DatumError::MissingWinner(self.status));
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Successor datum once `commitment` has withdrawn in `role`. Status is
    /// carried over unchanged; moving to `Completed` is an admin action.
    pub fn record_withdrawal(&self, commitment: Commitment, role: Role) -> PoolDatum {
        let mut next = self.clone();
        next.withdrawn_commitments.push(commitment);
        next.withdrawal_count = next.withdrawal_count.saturating_add(1);
        if role == Role::Winner {
            next.winner_withdrawn = true;
        }
        next
    }
}

fn fixed_bytes<const N: usize>(bytes: &[u8], field: &'static str) -> Result<[u8; N], DatumError> {
    bytes.try_into().map_err(|_| DatumError::FieldLength {
        field,
        expected: N,
        got: bytes.len(),
    })
}
