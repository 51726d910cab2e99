//! Deposit and withdrawal flows.
//!
//! Each flow runs strictly in order: reconcile, derive the secret, compute
//! the commitment, prove, then build and submit the transaction. Any failure
//! before submission leaves no chain or cache record. Deposit records are
//! written only after the submission succeeds; the one earlier write is a
//! new secret vault entry (see [`PoolSession::resolve_secret`]).

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use veilpot_lib::commitment::{check_deposit_amount, Commitment, CommitmentError};
use veilpot_lib::crypto::short_hex;
use veilpot_lib::datum::{DatumError, PoolDatum, PoolStatus};
use veilpot_lib::error::{ErrorClass, ProtocolError};
use veilpot_lib::proof::{
    resolve_role, Claim, Proof, ProofContext, ProofError, ProofMetadata, ProofRequest, Role,
    RoundRoot, RoundRootStatus, METADATA_LABEL,
};
use veilpot_lib::reconcile::{DepositRecord, ReconcileError, Reconciliation};
use veilpot_lib::secret::{derive_secret_checked, Secret, SecretError};
use veilpot_lib::settlement::{authorize_withdrawal, SettlementError};

use crate::cache::{CacheError, LocalCache, SecretVault};
use crate::indexer::{ChainIndexer, IndexerError};
use crate::prover::{ProofEngine, ProofOrigin};
use crate::reconciler::reconcile_pool;
use crate::wallet::{TxDraft, TxKind, WalletBridge, WalletError};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("pool is {status}; deposits are only accepted while collecting")]
    DepositsClosed { status: PoolStatus },

    #[error("a deposit with commitment {0} already exists this epoch")]
    DuplicateDeposit(Commitment),

    #[error("no secret available for epoch {epoch_id}, amount {amount}")]
    SecretUnavailable { epoch_id: u64, amount: u64 },

    #[error("pool state changed while proving: {0}")]
    StateChanged(String),

    #[error("deposit would overflow the pool total")]
    DepositOverflow,
}

macro_rules! protocol_from {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for FlowError {
                fn from(e: $error) -> Self {
                    FlowError::Protocol(e.into())
                }
            }
        )*
    };
}

protocol_from!(
    SecretError,
    CommitmentError,
    ProofError,
    DatumError,
    ReconcileError,
    SettlementError,
);

impl FlowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FlowError::Protocol(e) => e.class(),
            FlowError::Wallet(WalletError::Signing(SecretError::SigningDeclined)) => {
                ErrorClass::Authorization
            }
            FlowError::Indexer(_) | FlowError::Wallet(_) | FlowError::Cache(_) => {
                ErrorClass::ExternalDependency
            }
            FlowError::DepositsClosed { .. } => ErrorClass::Phase,
            FlowError::DuplicateDeposit(_) | FlowError::DepositOverflow => {
                ErrorClass::InputValidation
            }
            FlowError::SecretUnavailable { .. } => ErrorClass::Authorization,
            FlowError::StateChanged(_) => ErrorClass::Reconciliation,
        }
    }
}

/// How the deposit secret was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    WalletSignature,
    Vault,
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub epoch_id: u64,
    pub amount: u64,
    pub commitment: Commitment,
    pub proof: Proof,
    pub proof_origin: ProofOrigin,
    pub round_root_status: RoundRootStatus,
    pub secret_source: SecretSource,
    pub tx_id: String,
}

#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub epoch_id: u64,
    pub commitment: Commitment,
    pub role: Role,
    pub payout: u64,
    pub proof: Proof,
    pub proof_origin: ProofOrigin,
    pub tx_id: String,
}

/// Deposit announcement stored under [`METADATA_LABEL`]. Carries the full
/// commitment so participants can be listed without the datum.
#[derive(Serialize)]
struct DepositNotice {
    msg: [&'static str; 1],
    commitment: String,
    epoch: u64,
    proof_prefix: String,
    round_root_status: RoundRootStatus,
}

/// One participant's view of one pool
pub struct PoolSession<'a, W, I> {
    pub wallet: &'a W,
    pub indexer: &'a I,
    pub prover: &'a ProofEngine,
    pub pool_address: &'a str,
    pub cache: LocalCache,
    pub vault: SecretVault,
}

impl<'a, W: WalletBridge, I: ChainIndexer> PoolSession<'a, W, I> {
    /// Fresh reconciliation for `epoch_id` (current epoch when `None`)
    pub async fn pool_state(&self, epoch_id: Option<u64>) -> Result<Reconciliation, FlowError> {
        reconcile_pool(self.indexer, self.pool_address, &self.cache, epoch_id).await
    }

    /// Secret for `(epoch_id, amount)`: from the wallet signature, or from
    /// the vault when the wallet signs non-deterministically. Only deposits
    /// may create a vault entry.
    ///
    /// A new vault entry is the one local write made before submission. A
    /// deposit that reaches the chain must never exist without its secret on
    /// disk. An entry whose deposit never lands opens no funds and is reused
    /// by the next attempt.
    pub async fn resolve_secret(
        &mut self,
        epoch_id: u64,
        amount: u64,
        create: bool,
    ) -> Result<(Secret, SecretSource), FlowError> {
        match derive_secret_checked(self.wallet, epoch_id, amount).await {
            Ok(secret) => Ok((secret, SecretSource::WalletSignature)),
            Err(SecretError::NondeterministicSigner) => {
                warn!(epoch_id, amount, "wallet signatures are randomized, using the secret vault");
                let secret = if create {
                    self.vault.open_or_create(epoch_id, amount)?
                } else {
                    self.vault
                        .lookup(epoch_id, amount)?
                        .ok_or(FlowError::SecretUnavailable { epoch_id, amount })?
                };
                Ok((secret, SecretSource::Vault))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn deposit(&mut self, amount: u64) -> Result<DepositReceipt, FlowError> {
        check_deposit_amount(amount)?;

        let reconciliation = self.pool_state(None).await?;
        let state = &reconciliation.state;
        if !state.status.accepts_deposits() {
            return Err(FlowError::DepositsClosed {
                status: state.status,
            });
        }
        let epoch_id = state.epoch_id;

        let (secret, secret_source) = self.resolve_secret(epoch_id, amount, true).await?;
        let commitment = secret.commitment(amount);
        if self
            .cache
            .deposits_for(epoch_id)
            .any(|r| r.commitment == commitment)
        {
            return Err(FlowError::DuplicateDeposit(commitment));
        }

        let (round_root, round_root_status) = match reconciliation.round_root() {
            Some(root) => (root, RoundRootStatus::OnChain),
            None => (
                RoundRoot::derive(epoch_id, self.pool_address.as_bytes()),
                RoundRootStatus::Derived,
            ),
        };

        let request = ProofRequest {
            role: Role::Deposit,
            secret: &secret,
            commitment,
            context: ProofContext {
                round_root,
                claim: Claim::Deposit { amount },
            },
        };
        let (proof, proof_origin) = self.prover.prove(&request).await?;

        let next_datum = reconciliation
            .datum
            .as_ref()
            .map(|datum| with_deposit(datum, amount))
            .transpose()?;

        let notice = DepositNotice {
            msg: ["veilpot deposit"],
            commitment: commitment.to_hex(),
            epoch: epoch_id,
            proof_prefix: short_hex(proof.as_bytes()),
            round_root_status,
        };
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            METADATA_LABEL.to_string(),
            serde_json::to_value(&notice).map_err(WalletError::from)?,
        );

        let draft = TxDraft {
            kind: TxKind::Deposit,
            pool_address: self.pool_address.to_string(),
            amount,
            next_datum: next_datum.map(|d| d.to_hex()),
            metadata: serde_json::Value::Object(metadata),
            proof: proof.to_hex(),
        };
        let signed = self.wallet.sign_tx(draft).await?;
        let tx_id = self.wallet.submit(&signed).await?;

        self.cache.record_deposit(DepositRecord {
            commitment,
            amount,
            epoch_id,
            timestamp_ms: now_ms(),
            tx_hash: Some(tx_id.clone()),
        })?;
        info!(epoch_id, commitment = %commitment.short(), %tx_id, "deposit submitted");

        Ok(DepositReceipt {
            epoch_id,
            amount,
            commitment,
            proof,
            proof_origin,
            round_root_status,
            secret_source,
            tx_id,
        })
    }

    /// Withdraw the deposit of `amount` made in `epoch_id`.
    pub async fn withdraw(
        &mut self,
        epoch_id: Option<u64>,
        amount: u64,
    ) -> Result<WithdrawalReceipt, FlowError> {
        let reconciliation = self.pool_state(epoch_id).await?;
        let epoch_id = reconciliation.state.epoch_id;

        let (secret, _) = self.resolve_secret(epoch_id, amount, false).await?;
        let commitment = secret.commitment(amount);
        let winner = reconciliation.state.winner_commitment;
        let role = resolve_role(&commitment, winner.as_ref());

        // Fail on replay or phase before doing any proving work
        let plan = authorize_withdrawal(&commitment, role, &reconciliation)?;
        let round_root = plan.next_datum.round_root;

        let request = ProofRequest {
            role,
            secret: &secret,
            commitment,
            context: ProofContext {
                round_root,
                claim: Claim::Withdrawal {
                    amount,
                    winner_commitment: winner,
                },
            },
        };
        let (proof, proof_origin) = self.prover.prove(&request).await?;

        // The withdrawn set is re-read after every await
        let fresh = self.pool_state(Some(epoch_id)).await?;
        if fresh.round_root() != Some(round_root) {
            return Err(FlowError::StateChanged("round root moved".to_string()));
        }
        if resolve_role(&commitment, fresh.state.winner_commitment.as_ref()) != role {
            return Err(FlowError::StateChanged("winner changed".to_string()));
        }
        let plan = authorize_withdrawal(&commitment, role, &fresh)?;

        let metadata = ProofMetadata::new(&proof, epoch_id, RoundRootStatus::OnChain)
            .to_json()
            .map_err(WalletError::from)?;
        let draft = TxDraft {
            kind: TxKind::Withdraw,
            pool_address: self.pool_address.to_string(),
            amount: plan.payout,
            next_datum: Some(plan.next_datum.to_hex()),
            metadata,
            proof: proof.to_hex(),
        };
        let signed = self.wallet.sign_tx(draft).await?;
        let tx_id = self.wallet.submit(&signed).await?;
        info!(epoch_id, commitment = %commitment.short(), %role, payout = plan.payout, %tx_id, "withdrawal submitted");

        Ok(WithdrawalReceipt {
            epoch_id,
            commitment,
            role,
            payout: plan.payout,
            proof,
            proof_origin,
            tx_id,
        })
    }
}

fn with_deposit(datum: &PoolDatum, amount: u64) -> Result<PoolDatum, FlowError> {
    let mut next = datum.clone();
    next.total_deposited = next
        .total_deposited
        .checked_add(amount)
        .ok_or(FlowError::DepositOverflow)?;
    next.participant_count = next
        .participant_count
        .checked_add(1)
        .ok_or(FlowError::DepositOverflow)?;
    Ok(next)
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::tests::StaticIndexer;
    use crate::indexer::{EpochInfo, TxMetadata};
    use crate::wallet::SignedTx;
    use std::collections::VecDeque;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use veilpot_lib::proof::verify;
    use veilpot_lib::reconcile::ScriptUtxo;
    use veilpot_lib::secret::{derive_secret, SigningCapability};

    const POOL: &str = "addr_test1wpoolscript";

    /// Wallet double: signatures are a keyed hash of the message, optionally
    /// salted with a counter to mimic randomized signing.
    #[derive(Default)]
    struct RecordingWallet {
        randomized: bool,
        reject_submit: bool,
        counter: AtomicU64,
        submitted: Mutex<Vec<SignedTx>>,
    }

    impl SigningCapability for RecordingWallet {
        fn address(&self) -> String {
            "addr_test1qrecording".to_string()
        }

        async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SecretError> {
            let mut hasher = Sha256::new();
            hasher.update(b"recording-wallet-key");
            hasher.update(message.as_bytes());
            if self.randomized {
                hasher.update(self.counter.fetch_add(1, Ordering::SeqCst).to_be_bytes());
            }
            Ok(hasher.finalize().to_vec())
        }
    }

    impl WalletBridge for RecordingWallet {
        async fn sign_tx(&self, draft: TxDraft) -> Result<SignedTx, WalletError> {
            let signature = self.sign_message(&serde_json::to_string(&draft)?).await?;
            Ok(SignedTx {
                body: draft,
                signer: self.address(),
                signature: hex::encode(signature),
            })
        }

        async fn submit(&self, tx: &SignedTx) -> Result<String, WalletError> {
            if self.reject_submit {
                return Err(WalletError::Rejected {
                    status: 400,
                    body: "bad fee".to_string(),
                });
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(tx.clone());
            Ok(format!("tx{}", submitted.len()))
        }

        async fn get_balance(&self) -> Result<u64, WalletError> {
            Ok(1_000_000_000)
        }
    }

    fn datum(epoch_id: u64, status: PoolStatus) -> PoolDatum {
        PoolDatum {
            admin_key_hash: [0xad; 28],
            epoch_id,
            epoch_end_ms: 1_700_000_000_000,
            total_deposited: 200_000_000,
            participant_count: 4,
            round_root: RoundRoot::derive(epoch_id, &[0xad; 28]),
            status,
            stake_pool: "pool1test".to_string(),
            yield_amount: 2_000_000,
            winner_commitment: None,
            withdrawal_count: 0,
            winner_withdrawn: false,
            withdrawn_commitments: vec![],
        }
    }

    /// Indexer whose pool outputs change between reads: each read of the
    /// pool address serves the next datum, repeating the last one.
    struct ShiftingIndexer {
        epoch: StaticIndexer,
        datums: Mutex<VecDeque<PoolDatum>>,
        reads: AtomicU64,
    }

    impl ShiftingIndexer {
        fn new(datums: Vec<PoolDatum>) -> Self {
            Self {
                epoch: StaticIndexer {
                    epoch: datums[0].epoch_id,
                    ..Default::default()
                },
                datums: Mutex::new(datums.into()),
                reads: AtomicU64::new(0),
            }
        }
    }

    impl ChainIndexer for ShiftingIndexer {
        async fn latest_epoch(&self) -> Result<EpochInfo, IndexerError> {
            self.epoch.latest_epoch().await
        }

        async fn epoch(&self, epoch: u64) -> Result<EpochInfo, IndexerError> {
            self.epoch.epoch(epoch).await
        }

        async fn address_utxos(&self, _address: &str) -> Result<Vec<ScriptUtxo>, IndexerError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut datums = self.datums.lock().unwrap();
            let datum = if datums.len() > 1 {
                datums.pop_front().unwrap()
            } else {
                datums[0].clone()
            };
            Ok(indexer_with(&datum).utxos)
        }

        async fn address_transactions(&self, _address: &str) -> Result<Vec<String>, IndexerError> {
            Ok(vec![])
        }

        async fn tx_metadata(&self, _tx_hash: &str) -> Result<Vec<TxMetadata>, IndexerError> {
            Ok(vec![])
        }

        async fn address_balance(&self, _address: &str) -> Result<u64, IndexerError> {
            Ok(0)
        }
    }

    fn indexer_with(datum: &PoolDatum) -> StaticIndexer {
        StaticIndexer {
            epoch: datum.epoch_id,
            utxos: vec![ScriptUtxo {
                tx_hash: "00".repeat(32),
                output_index: 0,
                value: datum.total_deposited,
                inline_datum: Some(datum.encode()),
            }],
            ..Default::default()
        }
    }

    fn session<'a>(
        dir: &TempDir,
        wallet: &'a RecordingWallet,
        indexer: &'a StaticIndexer,
        prover: &'a ProofEngine,
    ) -> PoolSession<'a, RecordingWallet, StaticIndexer> {
        PoolSession {
            wallet,
            indexer,
            prover,
            pool_address: POOL,
            cache: LocalCache::open(dir.path().join("cache.json")).unwrap(),
            vault: SecretVault::open(dir.path().join("veilpot.priv")).unwrap(),
        }
    }

    fn shifting_session<'a>(
        dir: &TempDir,
        wallet: &'a RecordingWallet,
        indexer: &'a ShiftingIndexer,
        prover: &'a ProofEngine,
    ) -> PoolSession<'a, RecordingWallet, ShiftingIndexer> {
        PoolSession {
            wallet,
            indexer,
            prover,
            pool_address: POOL,
            cache: LocalCache::open(dir.path().join("cache.json")).unwrap(),
            vault: SecretVault::open(dir.path().join("veilpot.priv")).unwrap(),
        }
    }

    fn submitted_datum(wallet: &RecordingWallet, index: usize) -> PoolDatum {
        let submitted = wallet.submitted.lock().unwrap();
        let hex = submitted[index].body.next_datum.clone().unwrap();
        PoolDatum::from_hex(&hex).unwrap()
    }

    #[tokio::test]
    async fn test_deposit_submits_then_records() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let pool = datum(7, PoolStatus::Collecting);
        let indexer = indexer_with(&pool);
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        let receipt = session.deposit(50_000_000).await.unwrap();

        let expected = derive_secret(&wallet, 7, 50_000_000)
            .await
            .unwrap()
            .commitment(50_000_000);
        assert_eq!(receipt.commitment, expected);
        assert_eq!(receipt.secret_source, SecretSource::WalletSignature);
        assert_eq!(receipt.round_root_status, RoundRootStatus::OnChain);
        assert_eq!(receipt.proof_origin, ProofOrigin::Local);
        assert!(verify(&receipt.proof, &pool.round_root));

        let next = submitted_datum(&wallet, 0);
        assert_eq!(next.total_deposited, 250_000_000);
        assert_eq!(next.participant_count, 5);

        let submitted = wallet.submitted.lock().unwrap();
        let notice = &submitted[0].body.metadata["674"];
        assert_eq!(notice["commitment"], expected.to_hex());
        drop(submitted);

        let reopened = LocalCache::open(dir.path().join("cache.json")).unwrap();
        assert_eq!(reopened.deposits().len(), 1);
        assert_eq!(reopened.deposits()[0].tx_hash.as_deref(), Some("tx1"));

        // Same wallet, epoch and amount gives the same commitment
        assert!(matches!(
            session.deposit(50_000_000).await,
            Err(FlowError::DuplicateDeposit(c)) if c == expected
        ));
    }

    #[tokio::test]
    async fn test_deposit_rejected_outside_collecting() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let indexer = indexer_with(&datum(7, PoolStatus::Staking));
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        let error = session.deposit(50_000_000).await.unwrap_err();
        assert!(matches!(error, FlowError::DepositsClosed { status: PoolStatus::Staking }));
        assert_eq!(error.class(), ErrorClass::Phase);
        assert!(wallet.submitted.lock().unwrap().is_empty());
        assert!(session.cache.deposits().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_amount_bounds() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let indexer = indexer_with(&datum(7, PoolStatus::Collecting));
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        let error = session.deposit(1).await.unwrap_err();
        assert_eq!(error.class(), ErrorClass::InputValidation);
    }

    #[tokio::test]
    async fn test_failed_submission_leaves_no_record() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet {
            reject_submit: true,
            ..Default::default()
        };
        let indexer = indexer_with(&datum(7, PoolStatus::Collecting));
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        let error = session.deposit(50_000_000).await.unwrap_err();
        assert!(matches!(error, FlowError::Wallet(WalletError::Rejected { .. })));
        assert!(session.cache.deposits().is_empty());
    }

    #[tokio::test]
    async fn test_vault_secret_survives_failed_submission() {
        let dir = tempdir().unwrap();
        let indexer = indexer_with(&datum(7, PoolStatus::Collecting));
        let prover = ProofEngine::local_only();

        let rejecting = RecordingWallet {
            randomized: true,
            reject_submit: true,
            ..Default::default()
        };
        let mut first = session(&dir, &rejecting, &indexer, &prover);
        assert!(first.deposit(50_000_000).await.is_err());
        assert!(first.cache.deposits().is_empty());

        let stored = SecretVault::open(dir.path().join("veilpot.priv"))
            .unwrap()
            .lookup(7, 50_000_000)
            .unwrap()
            .unwrap();

        // The retry deposits under the secret already on disk
        let accepting = RecordingWallet {
            randomized: true,
            ..Default::default()
        };
        let mut retry = session(&dir, &accepting, &indexer, &prover);
        let receipt = retry.deposit(50_000_000).await.unwrap();
        assert_eq!(receipt.commitment, stored.commitment(50_000_000));
        assert_eq!(retry.vault.len(), 1);
    }

    #[tokio::test]
    async fn test_winner_withdrawal_pays_share_plus_yield() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let amount = 50_000_000;
        let mine = derive_secret(&wallet, 7, amount)
            .await
            .unwrap()
            .commitment(amount);

        let mut pool = datum(7, PoolStatus::Distributing);
        pool.winner_commitment = Some(mine);
        let indexer = indexer_with(&pool);
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        let receipt = session.withdraw(Some(7), amount).await.unwrap();
        assert_eq!(receipt.role, Role::Winner);
        assert_eq!(receipt.payout, 52_000_000);
        assert!(verify(&receipt.proof, &pool.round_root));

        let next = submitted_datum(&wallet, 0);
        assert!(next.winner_withdrawn);
        assert_eq!(next.withdrawn_commitments, vec![mine]);

        let submitted = wallet.submitted.lock().unwrap();
        assert_eq!(submitted[0].body.metadata["674"]["role"], "winner");
        assert_eq!(submitted[0].body.amount, 52_000_000);
    }

    #[tokio::test]
    async fn test_loser_withdrawal_and_replay() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let amount = 50_000_000;
        let mine = derive_secret(&wallet, 7, amount)
            .await
            .unwrap()
            .commitment(amount);

        let mut pool = datum(7, PoolStatus::Distributing);
        pool.winner_commitment = Some(Commitment::from_bytes([0xee; 32]));
        let indexer = indexer_with(&pool);
        let prover = ProofEngine::local_only();
        let mut first = session(&dir, &wallet, &indexer, &prover);
        let receipt = first.withdraw(Some(7), amount).await.unwrap();
        assert_eq!(receipt.role, Role::Loser);
        assert_eq!(receipt.payout, 50_000_000);

        // The ledger now carries the withdrawal
        let settled = submitted_datum(&wallet, 0);
        let indexer = indexer_with(&settled);
        let mut second = session(&dir, &wallet, &indexer, &prover);
        let error = second.withdraw(Some(7), amount).await.unwrap_err();
        assert!(matches!(
            &error,
            FlowError::Protocol(ProtocolError::Settlement(SettlementError::AlreadyWithdrawn(c))) if *c == mine
        ));
        assert_eq!(error.class(), ErrorClass::Replay);
        assert_eq!(wallet.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_withdrawal_landing_during_proving_is_a_replay() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let amount = 50_000_000;
        let mine = derive_secret(&wallet, 7, amount)
            .await
            .unwrap()
            .commitment(amount);

        let mut before = datum(7, PoolStatus::Distributing);
        before.winner_commitment = Some(Commitment::from_bytes([0xee; 32]));
        // Another client settles the same commitment while we prove
        let after = before.record_withdrawal(mine, Role::Loser);
        let indexer = ShiftingIndexer::new(vec![before, after]);
        let prover = ProofEngine::local_only();
        let mut session = shifting_session(&dir, &wallet, &indexer, &prover);

        let error = session.withdraw(Some(7), amount).await.unwrap_err();
        assert!(matches!(
            &error,
            FlowError::Protocol(ProtocolError::Settlement(SettlementError::AlreadyWithdrawn(c))) if *c == mine
        ));
        assert_eq!(error.class(), ErrorClass::Replay);
        assert_eq!(indexer.reads.load(Ordering::SeqCst), 2);
        assert!(wallet.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_root_moving_during_proving_aborts() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let amount = 50_000_000;

        let mut before = datum(7, PoolStatus::Distributing);
        before.winner_commitment = Some(Commitment::from_bytes([0xee; 32]));
        let mut after = before.clone();
        after.round_root = RoundRoot::from_bytes([0x99; 32]);
        let indexer = ShiftingIndexer::new(vec![before, after]);
        let prover = ProofEngine::local_only();
        let mut session = shifting_session(&dir, &wallet, &indexer, &prover);

        let error = session.withdraw(Some(7), amount).await.unwrap_err();
        assert!(matches!(error, FlowError::StateChanged(_)));
        assert_eq!(error.class(), ErrorClass::Reconciliation);
        assert!(wallet.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_requires_datum() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet::default();
        let indexer = StaticIndexer {
            epoch: 7,
            utxos: vec![ScriptUtxo {
                tx_hash: "aa".into(),
                output_index: 0,
                value: 100_000_000,
                inline_datum: None,
            }],
            ..Default::default()
        };
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);
        session.cache.set_status(7, PoolStatus::Distributing, 1).unwrap();

        let error = session.withdraw(None, 50_000_000).await.unwrap_err();
        assert!(matches!(
            error,
            FlowError::Protocol(ProtocolError::Settlement(SettlementError::NoAuthoritativeRecord))
        ));
        assert!(wallet.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_randomized_wallet_falls_back_to_vault() {
        let dir = tempdir().unwrap();
        let wallet = RecordingWallet {
            randomized: true,
            ..Default::default()
        };
        let indexer = indexer_with(&datum(7, PoolStatus::Collecting));
        let prover = ProofEngine::local_only();
        let mut session = session(&dir, &wallet, &indexer, &prover);

        // Nothing stored yet, and withdrawals never create secrets
        assert!(matches!(
            session.resolve_secret(7, 50_000_000, false).await,
            Err(FlowError::SecretUnavailable { .. })
        ));

        let receipt = session.deposit(50_000_000).await.unwrap();
        assert_eq!(receipt.secret_source, SecretSource::Vault);

        let (secret, source) = session.resolve_secret(7, 50_000_000, false).await.unwrap();
        assert_eq!(source, SecretSource::Vault);
        assert_eq!(secret.commitment(50_000_000), receipt.commitment);
    }
}
