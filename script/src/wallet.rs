//! Wallet bridge.
//!
//! The protocol only needs three things from a wallet: sign a message,
//! submit a transaction, and report a balance. [`WalletBridge`] is that
//! boundary; [`LocalKeyWallet`] implements it with a local private key.

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use veilpot_lib::secret::{SecretError, SigningCapability};

use crate::indexer::{ChainIndexer, HttpIndexer, IndexerError};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(#[from] SecretError),

    #[error("no submission endpoint configured")]
    SubmitUnavailable,

    #[error("submission request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("submission rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("balance lookup failed: {0}")]
    Balance(#[from] IndexerError),

    #[error("no indexer attached for balance lookups")]
    NoBalanceSource,

    #[error("could not encode transaction: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Unsigned settlement or deposit transaction, as handed to the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxDraft {
    pub kind: TxKind,
    pub pool_address: String,
    pub amount: u64,
    /// Datum the pool output must carry after this transaction, hex
    pub next_datum: Option<String>,
    /// Metadata keyed by label
    pub metadata: serde_json::Value,
    pub proof: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
}

/// Draft plus the wallet's signature over its canonical JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: TxDraft,
    pub signer: String,
    pub signature: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    tx_id: String,
}

/// Capability surface of a wallet vendor
#[allow(async_fn_in_trait)]
pub trait WalletBridge: SigningCapability {
    async fn sign_tx(&self, draft: TxDraft) -> Result<SignedTx, WalletError>;

    /// Broadcast a signed transaction, returning its id
    async fn submit(&self, tx: &SignedTx) -> Result<String, WalletError>;

    async fn get_balance(&self) -> Result<u64, WalletError>;
}

/// Wallet backed by a locally held secp256k1 key.
///
/// Signatures are RFC 6979 deterministic, so the same message always
/// yields the same deposit secret.
#[derive(Debug, Clone)]
pub struct LocalKeyWallet {
    signer: PrivateKeySigner,
    submit_url: Option<String>,
    indexer: Option<HttpIndexer>,
    http: reqwest::Client,
}

impl LocalKeyWallet {
    pub fn from_private_key(private_key: &str) -> Result<Self, WalletError> {
        let signer = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signer,
            submit_url: None,
            indexer: None,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_submit_url(mut self, submit_url: Option<String>) -> Self {
        self.submit_url = submit_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_indexer(mut self, indexer: HttpIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }

    async fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, SecretError> {
        let signature = self
            .signer
            .sign_message(message)
            .await
            .map_err(|e| SecretError::SignerUnavailable(e.to_string()))?;
        Ok(signature.as_bytes().to_vec())
    }
}

impl SigningCapability for LocalKeyWallet {
    fn address(&self) -> String {
        self.signer.address().to_string()
    }

    async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SecretError> {
        debug!(address = %self.address(), "signing message");
        self.sign_bytes(message.as_bytes()).await
    }
}

impl WalletBridge for LocalKeyWallet {
    async fn sign_tx(&self, draft: TxDraft) -> Result<SignedTx, WalletError> {
        let canonical = serde_json::to_vec(&draft)?;
        let signature = self.sign_bytes(&canonical).await?;
        Ok(SignedTx {
            body: draft,
            signer: self.address(),
            signature: hex::encode(signature),
        })
    }

    async fn submit(&self, tx: &SignedTx) -> Result<String, WalletError> {
        let submit_url = self
            .submit_url
            .as_deref()
            .ok_or(WalletError::SubmitUnavailable)?;

        let response = self
            .http
            .post(format!("{submit_url}/submit"))
            .timeout(SUBMIT_TIMEOUT)
            .json(tx)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let SubmitResponse { tx_id } = response.json().await?;
        info!(%tx_id, kind = ?tx.body.kind, "transaction submitted");
        Ok(tx_id)
    }

    async fn get_balance(&self) -> Result<u64, WalletError> {
        match &self.indexer {
            Some(indexer) => Ok(indexer.address_balance(&self.address()).await?),
            None => Err(WalletError::NoBalanceSource),
        }
    }
}
