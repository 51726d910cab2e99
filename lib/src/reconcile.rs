//! Pool state reconciliation.
//!
//! Pool state can live in three places at once: the inline datum at the
//! pool's script address, the raw value of the unspent outputs sitting at
//! that address, and a local cache written by the administrative console.
//! Each place is a [`StateSource`]; [`merge`] folds their observations into
//! one [`PoolState`] with a strict priority order:
//!
//! 1. ledger datum (authoritative when it decodes, validates, and names the
//!    requested epoch)
//! 2. UTXO sum (totals only; cannot recover status or winner)
//! 3. local cache (status/winner for the same epoch id, deposit records)
//!
//! Every observation carries the epoch id it was taken under and anything
//! tagged with a different epoch is dropped, so a UTXO total is never mixed
//! with a winner cached for another round.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::{debug, warn};

use crate::commitment::Commitment;
use crate::datum::{PoolDatum, PoolStatus};
use crate::proof::RoundRoot;
use crate::settlement::WithdrawnSet;

/// Annualized staking yield used for estimates, in basis points
pub const ESTIMATED_APY_BPS: u64 = 350;

/// Length of one pool epoch in milliseconds (5 days)
pub const EPOCH_LENGTH_MS: u64 = 5 * 24 * 60 * 60 * 1_000;

/// Milliseconds per 365-day year
pub const YEAR_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

const BPS_DENOMINATOR: u64 = 10_000;

/// One unspent output at the pool's script address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptUtxo {
    pub tx_hash: String,
    pub output_index: u32,
    /// Value in base units
    pub value: u64,
    /// Raw inline datum bytes, if the output carries one
    pub inline_datum: Option<Vec<u8>>,
}

/// Everything read from the chain in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// Epoch the chain reported as current when the snapshot was taken
    pub epoch_id: u64,
    pub epoch_end_ms: Option<u64>,
    pub utxos: Vec<ScriptUtxo>,
}

/// Status and winner an administrator recorded locally for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub epoch_id: u64,
    pub status: PoolStatus,
    pub winner_commitment: Option<Commitment>,
    pub updated_at_ms: u64,
}

/// Locally remembered deposit. A secondary index only; the datum wins
/// whenever it is readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub commitment: Commitment,
    pub amount: u64,
    pub epoch_id: u64,
    pub timestamp_ms: u64,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    LedgerDatum,
    UtxoSum,
    LocalCache,
}

/// What a single source reported for the requested epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Datum(PoolDatum),
    UtxoSum {
        snapshot_epoch: u64,
        epoch_end_ms: Option<u64>,
        total_deposited: u64,
        participant_count: u64,
    },
    Cache {
        entry: Option<CacheEntry>,
        deposit_totals: Option<(u64, u64)>,
    },
    Unavailable {
        source: SourceKind,
        reason: String,
    },
}

/// A provider of pool state observations.
pub trait StateSource {
    fn kind(&self) -> SourceKind;

    fn observe(&self, epoch_id: u64) -> Observation;
}

/// Reads the inline datum from a chain snapshot.
#[derive(Debug, Clone, Copy)]
pub struct LedgerDatumSource<'a> {
    snapshot: &'a ChainSnapshot,
}

impl<'a> LedgerDatumSource<'a> {
    pub fn new(snapshot: &'a ChainSnapshot) -> Self {
        Self { snapshot }
    }
}

impl StateSource for LedgerDatumSource<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::LedgerDatum
    }

    fn observe(&self, epoch_id: u64) -> Observation {
        let mut candidates = Vec::new();
        let mut last_failure = None;

        for utxo in &self.snapshot.utxos {
            let Some(raw) = utxo.inline_datum.as_deref() else {
                continue;
            };
            match PoolDatum::decode(raw).and_then(|datum| datum.validate().map(|()| datum)) {
                Ok(datum) => candidates.push(datum),
                Err(e) => {
                    debug!(tx = %utxo.tx_hash, index = utxo.output_index, error = %e, "skipping unusable datum");
                    last_failure = Some(e.to_string());
                }
            }
        }

        let (mut matching, others): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|d| d.epoch_id == epoch_id);

        // No datum for the requested epoch: surface the newest one so the
        // merge step can report the mismatch.
        if matching.is_empty() {
            return match others
                .into_iter()
                .max_by_key(|d| (d.epoch_id, d.withdrawal_count))
            {
                Some(datum) => Observation::Datum(datum),
                None => Observation::Unavailable {
                    source: SourceKind::LedgerDatum,
                    reason: last_failure
                        .unwrap_or_else(|| "no inline datum at pool address".to_string()),
                },
            };
        }

        // Output order is not meaningful. The datum with the most recorded
        // withdrawals wins; two different datums tied at the top are refused.
        matching.sort_by_key(|d| Reverse(d.withdrawal_count));
        matching.dedup();
        if let [first, second, ..] = matching.as_slice() {
            if first.withdrawal_count == second.withdrawal_count {
                warn!(epoch_id, count = matching.len(), "conflicting datums at pool address");
                return Observation::Unavailable {
                    source: SourceKind::LedgerDatum,
                    reason: format!(
                        "{} conflicting datums for epoch {epoch_id}",
                        matching.len()
                    ),
                };
            }
        }
        Observation::Datum(matching.swap_remove(0))
    }
}

/// Sums the raw value of every output in a chain snapshot.
#[derive(Debug, Clone, Copy)]
pub struct UtxoSumSource<'a> {
    snapshot: &'a ChainSnapshot,
}

impl<'a> UtxoSumSource<'a> {
    pub fn new(snapshot: &'a ChainSnapshot) -> Self {
        Self { snapshot }
    }
}

impl StateSource for UtxoSumSource<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::UtxoSum
    }

    fn observe(&self, _epoch_id: u64) -> Observation {
        let utxos = &self.snapshot.utxos;
        if utxos.is_empty() {
            return Observation::Unavailable {
                source: SourceKind::UtxoSum,
                reason: "no unspent outputs at pool address".to_string(),
            };
        }

        let total = utxos
            .iter()
            .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.value));
        let Some(total_deposited) = total else {
            return Observation::Unavailable {
                source: SourceKind::UtxoSum,
                reason: "output values overflow".to_string(),
            };
        };

        Observation::UtxoSum {
            snapshot_epoch: self.snapshot.epoch_id,
            epoch_end_ms: self.snapshot.epoch_end_ms,
            total_deposited,
            participant_count: u64::try_from(utxos.len()).unwrap_or(u64::MAX),
        }
    }
}

/// Reads the administrator's cache entry and local deposit records.
#[derive(Debug, Clone, Copy)]
pub struct LocalCacheSource<'a> {
    entry: Option<&'a CacheEntry>,
    deposits: &'a [DepositRecord],
}

impl<'a> LocalCacheSource<'a> {
    pub fn new(entry: Option<&'a CacheEntry>, deposits: &'a [DepositRecord]) -> Self {
        Self { entry, deposits }
    }
}

impl StateSource for LocalCacheSource<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalCache
    }

    fn observe(&self, epoch_id: u64) -> Observation {
        let mut total = 0u64;
        let mut count = 0u64;
        for record in self.deposits.iter().filter(|r| r.epoch_id == epoch_id) {
            total = total.saturating_add(record.amount);
            count += 1;
        }

        Observation::Cache {
            entry: self.entry.cloned(),
            deposit_totals: (count > 0).then_some((total, count)),
        }
    }
}

/// Where the reconciled totals came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateOrigin {
    LedgerDatum,
    UtxoSum,
    LocalCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YieldSource {
    OnChain,
    Estimated,
}

/// Reconciled, read-only view of one pool round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub epoch_id: u64,
    pub status: PoolStatus,
    pub total_deposited: u64,
    pub participant_count: u64,
    pub yield_amount: u64,
    pub yield_source: YieldSource,
    pub epoch_end_ms: Option<u64>,
    pub winner_commitment: Option<Commitment>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: PoolState,
    pub origin: StateOrigin,
    /// The authoritative datum, when the ledger source won
    pub datum: Option<PoolDatum>,
}

impl Reconciliation {
    /// Replay guard re-derived from the on-chain record. `None` when no
    /// datum backs this reconciliation.
    pub fn withdrawn_set(&self) -> Option<WithdrawnSet> {
        self.datum.as_ref().map(WithdrawnSet::from_datum)
    }

    pub fn round_root(&self) -> Option<RoundRoot> {
        self.datum.as_ref().map(|datum| datum.round_root)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("pool for epoch {epoch_id} is uninitialized: no datum, no unspent outputs, no cached state")]
    Uninitialized { epoch_id: u64 },
}

/// Advisory yield for one epoch at [`ESTIMATED_APY_BPS`].
pub fn estimate_yield(total_deposited: u64) -> u64 {
    let numerator = u128::from(total_deposited)
        * u128::from(ESTIMATED_APY_BPS)
        * u128::from(EPOCH_LENGTH_MS);
    let denominator = u128::from(BPS_DENOMINATOR) * u128::from(YEAR_MS);
    u64::try_from(numerator / denominator).unwrap_or(u64::MAX)
}

/// Read all three sources for `epoch_id` and merge them.
pub fn reconcile<L, U, C>(
    epoch_id: u64,
    ledger: &L,
    utxo_sum: &U,
    cache: &C,
) -> Result<Reconciliation, ReconcileError>
where
    L: StateSource,
    U: StateSource,
    C: StateSource,
{
    merge(
        epoch_id,
        ledger.observe(epoch_id),
        utxo_sum.observe(epoch_id),
        cache.observe(epoch_id),
    )
}

/// Fold three observations into one [`Reconciliation`] by priority.
pub fn merge(
    epoch_id: u64,
    ledger: Observation,
    utxo_sum: Observation,
    cache: Observation,
) -> Result<Reconciliation, ReconcileError> {
    if let Some(datum) = accept_datum(epoch_id, ledger) {
        return Ok(from_datum(datum));
    }

    let chain_totals = match utxo_sum {
        Observation::UtxoSum {
            snapshot_epoch,
            epoch_end_ms,
            total_deposited,
            participant_count,
        } if snapshot_epoch == epoch_id => Some((total_deposited, participant_count, epoch_end_ms)),
        Observation::UtxoSum { snapshot_epoch, .. } => {
            warn!(epoch_id, snapshot_epoch, "discarding utxo sum taken under another epoch");
            None
        }
        other => {
            log_unavailable(&other);
            None
        }
    };

    let (cache_entry, cache_totals) = match cache {
        Observation::Cache {
            entry,
            deposit_totals,
        } => (entry, deposit_totals),
        other => {
            log_unavailable(&other);
            (None, None)
        }
    };

    // A cached entry for another epoch means the round has rolled over;
    // a new epoch always starts open.
    let cache_entry = match cache_entry {
        Some(entry) if entry.epoch_id == epoch_id => Some(entry),
        Some(entry) => {
            debug!(epoch_id, cached_epoch = entry.epoch_id, "ignoring cache entry for another epoch");
            None
        }
        None => None,
    };

    let (total_deposited, participant_count, epoch_end_ms, origin) = match (chain_totals, cache_totals) {
        (Some((total, count, end)), _) => (total, count, end, StateOrigin::UtxoSum),
        (None, Some((total, count))) => (total, count, None, StateOrigin::LocalCache),
        (None, None) if cache_entry.is_some() => (0, 0, None, StateOrigin::LocalCache),
        (None, None) => return Err(ReconcileError::Uninitialized { epoch_id }),
    };

    let (status, winner_commitment) = match cache_entry {
        Some(entry) => (entry.status, entry.winner_commitment),
        None => (PoolStatus::Collecting, None),
    };

    Ok(Reconciliation {
        state: PoolState {
            epoch_id,
            status,
            total_deposited,
            participant_count,
            yield_amount: estimate_yield(total_deposited),
            yield_source: YieldSource::Estimated,
            epoch_end_ms,
            winner_commitment,
        },
        origin,
        datum: None,
    })
}

fn accept_datum(epoch_id: u64, observation: Observation) -> Option<PoolDatum> {
    match observation {
        Observation::Datum(datum) if datum.epoch_id == epoch_id => Some(datum),
        Observation::Datum(datum) => {
            warn!(epoch_id, datum_epoch = datum.epoch_id, "discarding datum for another epoch");
            None
        }
        other => {
            log_unavailable(&other);
            None
        }
    }
}

fn from_datum(datum: PoolDatum) -> Reconciliation {
    let (yield_amount, yield_source) = if datum.yield_amount > 0 {
        (datum.yield_amount, YieldSource::OnChain)
    } else {
        (estimate_yield(datum.total_deposited), YieldSource::Estimated)
    };

    Reconciliation {
        state: PoolState {
            epoch_id: datum.epoch_id,
            status: datum.status,
            total_deposited: datum.total_deposited,
            participant_count: datum.participant_count,
            yield_amount,
            yield_source,
            epoch_end_ms: Some(datum.epoch_end_ms),
            winner_commitment: datum.winner_commitment,
        },
        origin: StateOrigin::LedgerDatum,
        datum: Some(datum),
    }
}

fn log_unavailable(observation: &Observation) {
    if let Observation::Unavailable { source, reason } = observation {
        debug!(?source, %reason, "state source unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::tests::sample_datum;
    use crate::proof::Role;

    fn utxo(value: u64, datum: Option<Vec<u8>>) -> ScriptUtxo {
        ScriptUtxo {
            tx_hash: format!("{:064x}", value),
            output_index: 0,
            value,
            inline_datum: datum,
        }
    }

    fn collecting_datum(epoch_id: u64, total: u64, participants: u64) -> PoolDatum {
        let mut datum = sample_datum();
        datum.epoch_id = epoch_id;
        datum.status = PoolStatus::Collecting;
        datum.total_deposited = total;
        datum.participant_count = participants;
        datum.winner_commitment = None;
        datum.withdrawal_count = 0;
        datum.withdrawn_commitments.clear();
        datum.yield_amount = 0;
        datum
    }

    fn cache_entry(epoch_id: u64, status: PoolStatus) -> CacheEntry {
        CacheEntry {
            epoch_id,
            status,
            winner_commitment: Some(Commitment::from_bytes([0xcc; 32])),
            updated_at_ms: 1,
        }
    }

    #[test]
    fn test_datum_wins_and_foreign_cache_is_ignored() {
        // Datum says 500 over 2 participants; the outputs would imply 300;
        // the cache claims Distributing for a different epoch.
        let datum = collecting_datum(7, 500, 2);
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![utxo(100, Some(datum.encode())), utxo(200, None)],
        };
        let entry = cache_entry(6, PoolStatus::Distributing);

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&entry), &[]),
        )
        .unwrap();

        assert_eq!(result.origin, StateOrigin::LedgerDatum);
        assert_eq!(result.state.total_deposited, 500);
        assert_eq!(result.state.participant_count, 2);
        assert_eq!(result.state.status, PoolStatus::Collecting);
        assert_eq!(result.state.winner_commitment, None);
        assert_eq!(result.datum, Some(datum));
    }

    #[test]
    fn test_datum_beats_same_epoch_cache() {
        let datum = collecting_datum(7, 500, 2);
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![utxo(500, Some(datum.encode()))],
        };
        let entry = cache_entry(7, PoolStatus::Distributing);

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&entry), &[]),
        )
        .unwrap();
        assert_eq!(result.state.status, PoolStatus::Collecting);
    }

    #[test]
    fn test_utxo_sum_fallback_with_matching_cache() {
        let snapshot = ChainSnapshot {
            epoch_id: 9,
            epoch_end_ms: Some(42),
            utxos: vec![utxo(100, Some(vec![0xde, 0xad])), utxo(200, None)],
        };
        let entry = cache_entry(9, PoolStatus::Distributing);

        let result = reconcile(
            9,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&entry), &[]),
        )
        .unwrap();

        assert_eq!(result.origin, StateOrigin::UtxoSum);
        assert_eq!(result.state.total_deposited, 300);
        assert_eq!(result.state.participant_count, 2);
        assert_eq!(result.state.status, PoolStatus::Distributing);
        assert_eq!(result.state.winner_commitment, entry.winner_commitment);
        assert_eq!(result.state.epoch_end_ms, Some(42));
        assert_eq!(result.state.yield_source, YieldSource::Estimated);
        assert!(result.withdrawn_set().is_none());
    }

    #[test]
    fn test_utxo_sum_fallback_resets_status_on_epoch_mismatch() {
        let snapshot = ChainSnapshot {
            epoch_id: 9,
            epoch_end_ms: None,
            utxos: vec![utxo(300, None)],
        };
        let entry = cache_entry(8, PoolStatus::Distributing);

        let result = reconcile(
            9,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&entry), &[]),
        )
        .unwrap();

        assert_eq!(result.state.status, PoolStatus::Collecting);
        assert_eq!(result.state.winner_commitment, None);
    }

    #[test]
    fn test_snapshot_from_other_epoch_is_discarded() {
        let snapshot = ChainSnapshot {
            epoch_id: 10,
            epoch_end_ms: None,
            utxos: vec![utxo(300, None)],
        };

        let result = reconcile(
            9,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(None, &[]),
        );
        assert_eq!(result.unwrap_err(), ReconcileError::Uninitialized { epoch_id: 9 });
    }

    #[test]
    fn test_datum_for_other_epoch_is_discarded() {
        let datum = collecting_datum(6, 500, 2);
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![utxo(700, Some(datum.encode()))],
        };

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(None, &[]),
        )
        .unwrap();
        assert_eq!(result.origin, StateOrigin::UtxoSum);
        assert_eq!(result.state.total_deposited, 700);
    }

    #[test]
    fn test_invalid_datum_falls_back() {
        let mut datum = collecting_datum(7, 500, 2);
        datum.withdrawal_count = 3;
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![utxo(450, Some(datum.encode()))],
        };

        let ledger = LedgerDatumSource::new(&snapshot).observe(7);
        assert!(matches!(ledger, Observation::Unavailable { source: SourceKind::LedgerDatum, .. }));

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(None, &[]),
        )
        .unwrap();
        assert_eq!(result.origin, StateOrigin::UtxoSum);
        assert_eq!(result.state.total_deposited, 450);
    }

    #[test]
    fn test_cache_only_path_uses_deposit_records() {
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![],
        };
        let deposits = vec![
            DepositRecord {
                commitment: Commitment::from_bytes([1; 32]),
                amount: 40,
                epoch_id: 7,
                timestamp_ms: 1,
                tx_hash: None,
            },
            DepositRecord {
                commitment: Commitment::from_bytes([2; 32]),
                amount: 60,
                epoch_id: 7,
                timestamp_ms: 2,
                tx_hash: Some("ab".to_string()),
            },
            DepositRecord {
                commitment: Commitment::from_bytes([3; 32]),
                amount: 1_000,
                epoch_id: 6,
                timestamp_ms: 3,
                tx_hash: None,
            },
        ];
        let entry = cache_entry(7, PoolStatus::Staking);

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&entry), &deposits),
        )
        .unwrap();

        assert_eq!(result.origin, StateOrigin::LocalCache);
        assert_eq!(result.state.total_deposited, 100);
        assert_eq!(result.state.participant_count, 2);
        assert_eq!(result.state.status, PoolStatus::Staking);
    }

    #[test]
    fn test_nothing_available_is_uninitialized() {
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![],
        };
        let stale = cache_entry(3, PoolStatus::Completed);

        let result = reconcile(
            7,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(Some(&stale), &[]),
        );
        assert_eq!(result.unwrap_err(), ReconcileError::Uninitialized { epoch_id: 7 });
    }

    #[test]
    fn test_on_chain_yield_preferred_over_estimate() {
        let datum = sample_datum();
        let snapshot = ChainSnapshot {
            epoch_id: datum.epoch_id,
            epoch_end_ms: None,
            utxos: vec![utxo(1, Some(datum.encode()))],
        };

        let result = reconcile(
            datum.epoch_id,
            &LedgerDatumSource::new(&snapshot),
            &UtxoSumSource::new(&snapshot),
            &LocalCacheSource::new(None, &[]),
        )
        .unwrap();

        assert_eq!(result.state.yield_amount, 2_000_000);
        assert_eq!(result.state.yield_source, YieldSource::OnChain);
        assert_eq!(result.round_root(), Some(datum.round_root));
        assert_eq!(result.withdrawn_set().unwrap().len(), 1);
    }

    #[test]
    fn test_zero_on_chain_yield_is_estimated() {
        let datum = collecting_datum(7, 1_000_000_000, 10);
        let result = merge(
            7,
            Observation::Datum(datum),
            Observation::Unavailable {
                source: SourceKind::UtxoSum,
                reason: "unused".to_string(),
            },
            Observation::Cache {
                entry: None,
                deposit_totals: None,
            },
        )
        .unwrap();

        assert_eq!(result.state.yield_source, YieldSource::Estimated);
        assert_eq!(result.state.yield_amount, estimate_yield(1_000_000_000));
    }

    #[test]
    fn test_ledger_prefers_datum_with_most_withdrawals() {
        let older = sample_datum();
        let newer = older.record_withdrawal(Commitment::from_bytes([0x03; 32]), Role::Loser);

        for utxos in [
            vec![utxo(1, Some(older.encode())), utxo(2, Some(newer.encode()))],
            vec![utxo(2, Some(newer.encode())), utxo(1, Some(older.encode()))],
        ] {
            let snapshot = ChainSnapshot {
                epoch_id: 7,
                epoch_end_ms: None,
                utxos,
            };
            assert_eq!(
                LedgerDatumSource::new(&snapshot).observe(7),
                Observation::Datum(newer.clone())
            );
        }
    }

    #[test]
    fn test_ledger_refuses_conflicting_datums() {
        let honest = sample_datum();
        let mut forged = honest.clone();
        forged.yield_amount = 900_000_000;
        let snapshot = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![
                utxo(1, Some(honest.encode())),
                utxo(2, Some(forged.encode())),
                utxo(3, Some(honest.encode())),
            ],
        };

        assert!(matches!(
            LedgerDatumSource::new(&snapshot).observe(7),
            Observation::Unavailable { source: SourceKind::LedgerDatum, .. }
        ));

        // Identical copies of one datum are not a conflict
        let duplicated = ChainSnapshot {
            epoch_id: 7,
            epoch_end_ms: None,
            utxos: vec![utxo(1, Some(honest.encode())), utxo(2, Some(honest.encode()))],
        };
        assert_eq!(
            LedgerDatumSource::new(&duplicated).observe(7),
            Observation::Datum(honest)
        );
    }

    #[test]
    fn test_estimate_yield() {
        // 1,000,000 ADA at 3.5% for 5 of 365 days
        assert_eq!(estimate_yield(1_000_000_000_000), 479_452_054);
        assert_eq!(estimate_yield(0), 0);
        assert!(estimate_yield(u64::MAX) > 0);
    }
}
