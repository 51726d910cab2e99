use tracing::info;

use veilpot_lib::reconcile::{
    reconcile, LedgerDatumSource, LocalCacheSource, Reconciliation, UtxoSumSource,
};

use crate::cache::LocalCache;
use crate::flows::FlowError;
use crate::indexer::{fetch_snapshot, ChainIndexer};

/// Reconcile the pool at `pool_address` for `epoch_id` (the chain's current
/// epoch when `None`).
///
/// The chain is read once per call and every source observes that same
/// snapshot. Indexer failures propagate; they never fall back to cached
/// state.
pub async fn reconcile_pool<I: ChainIndexer>(
    indexer: &I,
    pool_address: &str,
    cache: &LocalCache,
    epoch_id: Option<u64>,
) -> Result<Reconciliation, FlowError> {
    let snapshot = fetch_snapshot(indexer, pool_address).await?;
    let epoch_id = epoch_id.unwrap_or(snapshot.epoch_id);

    let reconciliation = reconcile(
        epoch_id,
        &LedgerDatumSource::new(&snapshot),
        &UtxoSumSource::new(&snapshot),
        &LocalCacheSource::new(cache.entry(), cache.deposits()),
    )
    .map_err(veilpot_lib::ProtocolError::from)?;

    info!(
        epoch_id,
        origin = ?reconciliation.origin,
        status = %reconciliation.state.status,
        total = reconciliation.state.total_deposited,
        participants = reconciliation.state.participant_count,
        "reconciled pool state"
    );
    Ok(reconciliation)
}
