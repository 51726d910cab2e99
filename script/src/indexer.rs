//! Chain indexer client.
//!
//! Speaks the Blockfrost-style REST API: address UTXOs with inline datums,
//! epoch boundaries, address transactions, and transaction metadata.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use veilpot_lib::commitment::Commitment;
use veilpot_lib::proof::METADATA_LABEL;
use veilpot_lib::reconcile::{ChainSnapshot, ScriptUtxo};

/// Unit name of the chain's base currency
pub const BASE_UNIT: &str = "lovelace";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("indexer returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("malformed indexer response: {0}")]
    Malformed(String),
}

/// Epoch boundaries in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochInfo {
    pub epoch: u64,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// One metadata entry attached to a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxMetadata {
    pub label: String,
    pub json: serde_json::Value,
}

/// Read access to chain state
#[allow(async_fn_in_trait)]
pub trait ChainIndexer {
    async fn latest_epoch(&self) -> Result<EpochInfo, IndexerError>;

    async fn epoch(&self, epoch: u64) -> Result<EpochInfo, IndexerError>;

    async fn address_utxos(&self, address: &str) -> Result<Vec<ScriptUtxo>, IndexerError>;

    /// Recent transaction hashes touching `address`, newest first
    async fn address_transactions(&self, address: &str) -> Result<Vec<String>, IndexerError>;

    async fn tx_metadata(&self, tx_hash: &str) -> Result<Vec<TxMetadata>, IndexerError>;

    /// Base-unit balance held at `address`
    async fn address_balance(&self, address: &str) -> Result<u64, IndexerError>;
}

/// Read the current epoch and every output at `address` in one pass.
pub async fn fetch_snapshot<I: ChainIndexer>(
    indexer: &I,
    address: &str,
) -> Result<ChainSnapshot, IndexerError> {
    let epoch = indexer.latest_epoch().await?;
    let utxos = indexer.address_utxos(address).await?;
    debug!(epoch = epoch.epoch, outputs = utxos.len(), "fetched chain snapshot");
    Ok(ChainSnapshot {
        epoch_id: epoch.epoch,
        epoch_end_ms: Some(epoch.end_ms),
        utxos,
    })
}

/// Commitments announced in deposit metadata at `address`.
///
/// Used for display when the datum does not enumerate participants. Entries
/// that carry only an abbreviated commitment are skipped.
pub async fn deposit_commitments<I: ChainIndexer>(
    indexer: &I,
    address: &str,
) -> Result<Vec<Commitment>, IndexerError> {
    let label = METADATA_LABEL.to_string();
    let mut found = Vec::new();

    for tx_hash in indexer.address_transactions(address).await? {
        for entry in indexer.tx_metadata(&tx_hash).await? {
            if entry.label != label {
                continue;
            }
            let Some(hex) = entry.json.get("commitment").and_then(|v| v.as_str()) else {
                continue;
            };
            match Commitment::from_hex(hex) {
                Ok(commitment) if !found.contains(&commitment) => found.push(commitment),
                Ok(_) => {}
                Err(e) => debug!(tx = %tx_hash, error = %e, "skipping abbreviated commitment"),
            }
        }
    }
    Ok(found)
}

/// HTTP client for a Blockfrost-compatible indexer
#[derive(Debug, Clone)]
pub struct HttpIndexer {
    base_url: String,
    project_id: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct AmountEntry {
    unit: String,
    quantity: String,
}

#[derive(Deserialize)]
struct UtxoResponse {
    tx_hash: String,
    output_index: u32,
    amount: Vec<AmountEntry>,
    inline_datum: Option<String>,
}

#[derive(Deserialize)]
struct EpochResponse {
    epoch: u64,
    start_time: u64,
    end_time: u64,
}

#[derive(Deserialize)]
struct AddressTxResponse {
    tx_hash: String,
}

#[derive(Deserialize)]
struct MetadataResponse {
    label: String,
    json_metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct AddressResponse {
    amount: Vec<AmountEntry>,
}

impl HttpIndexer {
    pub fn new(base_url: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id,
            http: reqwest::Client::new(),
        }
    }

    /// GET `path`, mapping 404 to `None`
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, IndexerError> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .timeout(REQUEST_TIMEOUT);
        if let Some(project_id) = &self.project_id {
            request = request.header("project_id", project_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), path, "indexer request rejected");
            return Err(IndexerError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(Some(response.json().await?))
    }

    async fn get_required<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, IndexerError> {
        self.get_json(path).await?.ok_or(IndexerError::Status {
            status: 404,
            path: path.to_string(),
        })
    }
}

fn base_quantity(amounts: &[AmountEntry]) -> Result<u64, IndexerError> {
    amounts
        .iter()
        .filter(|a| a.unit == BASE_UNIT)
        .try_fold(0u64, |acc, a| {
            let quantity: u64 = a
                .quantity
                .parse()
                .map_err(|_| IndexerError::Malformed(format!("quantity {:?}", a.quantity)))?;
            acc.checked_add(quantity)
                .ok_or_else(|| IndexerError::Malformed("quantity overflow".to_string()))
        })
}

fn epoch_info(response: EpochResponse) -> EpochInfo {
    EpochInfo {
        epoch: response.epoch,
        start_ms: response.start_time.saturating_mul(1_000),
        end_ms: response.end_time.saturating_mul(1_000),
    }
}

impl ChainIndexer for HttpIndexer {
    async fn latest_epoch(&self) -> Result<EpochInfo, IndexerError> {
        Ok(epoch_info(self.get_required("/epochs/latest").await?))
    }

    async fn epoch(&self, epoch: u64) -> Result<EpochInfo, IndexerError> {
        Ok(epoch_info(self.get_required(&format!("/epochs/{epoch}")).await?))
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<ScriptUtxo>, IndexerError> {
        let path = format!("/addresses/{address}/utxos");
        let Some(entries) = self.get_json::<Vec<UtxoResponse>>(&path).await? else {
            // Unknown address: nothing has ever been sent there
            return Ok(Vec::new());
        };

        entries
            .into_iter()
            .map(|entry| {
                let inline_datum = match entry.inline_datum {
                    Some(hex_datum) => match hex::decode(&hex_datum) {
                        Ok(bytes) => Some(bytes),
                        Err(_) => {
                            debug!(tx = %entry.tx_hash, "inline datum is not hex");
                            None
                        }
                    },
                    None => None,
                };
                Ok(ScriptUtxo {
                    value: base_quantity(&entry.amount)?,
                    tx_hash: entry.tx_hash,
                    output_index: entry.output_index,
                    inline_datum,
                })
            })
            .collect()
    }

    async fn address_transactions(&self, address: &str) -> Result<Vec<String>, IndexerError> {
        let path = format!("/addresses/{address}/transactions?order=desc");
        let entries: Vec<AddressTxResponse> = self.get_json(&path).await?.unwrap_or_default();
        Ok(entries.into_iter().map(|e| e.tx_hash).collect())
    }

    async fn tx_metadata(&self, tx_hash: &str) -> Result<Vec<TxMetadata>, IndexerError> {
        let path = format!("/txs/{tx_hash}/metadata");
        let entries: Vec<MetadataResponse> = self.get_json(&path).await?.unwrap_or_default();
        Ok(entries
            .into_iter()
            .map(|e| TxMetadata {
                label: e.label,
                json: e.json_metadata,
            })
            .collect())
    }

    async fn address_balance(&self, address: &str) -> Result<u64, IndexerError> {
        match self.get_json::<AddressResponse>(&format!("/addresses/{address}")).await? {
            Some(response) => base_quantity(&response.amount),
            None => Ok(0),
        }
    }
}
