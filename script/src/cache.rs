//! Local files: the admin fallback cache and the secret vault.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use veilpot_lib::commitment::Commitment;
use veilpot_lib::datum::PoolStatus;
use veilpot_lib::reconcile::{CacheEntry, DepositRecord};
use veilpot_lib::secret::{Secret, SecretError, SECRET_LENGTH};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored secret is invalid: {0}")]
    InvalidSecret(#[from] SecretError),

    #[error("status cannot move from {from} back to {to}")]
    StatusRegression { from: PoolStatus, to: PoolStatus },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheContents {
    /// Last status/winner written by the admin console
    entry: Option<CacheEntry>,
    deposits: Vec<DepositRecord>,
}

/// Client-local fallback store.
///
/// Holds the last administrator write and the deposits made from this
/// machine. Only consulted when the chain has no readable datum.
#[derive(Debug)]
pub struct LocalCache {
    path: PathBuf,
    contents: CacheContents,
}

impl LocalCache {
    /// Open the cache at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let contents = match read_json(&path)? {
            Some(contents) => contents,
            None => CacheContents::default(),
        };
        Ok(Self { path, contents })
    }

    pub fn entry(&self) -> Option<&CacheEntry> {
        self.contents.entry.as_ref()
    }

    pub fn deposits(&self) -> &[DepositRecord] {
        &self.contents.deposits
    }

    pub fn deposits_for(&self, epoch_id: u64) -> impl Iterator<Item = &DepositRecord> {
        self.contents
            .deposits
            .iter()
            .filter(move |r| r.epoch_id == epoch_id)
    }

    /// Record an admin status change. Within one epoch status only moves
    /// forward; a new epoch id replaces the entry.
    pub fn set_status(
        &mut self,
        epoch_id: u64,
        status: PoolStatus,
        now_ms: u64,
    ) -> Result<(), CacheError> {
        let winner_commitment = match &self.contents.entry {
            Some(entry) if entry.epoch_id == epoch_id => {
                if status != entry.status && !entry.status.can_advance_to(status) {
                    return Err(CacheError::StatusRegression {
                        from: entry.status,
                        to: status,
                    });
                }
                entry.winner_commitment
            }
            _ => None,
        };

        self.contents.entry = Some(CacheEntry {
            epoch_id,
            status,
            winner_commitment,
            updated_at_ms: now_ms,
        });
        info!(epoch_id, %status, "cached pool status");
        self.save()
    }

    /// Record the drawn winner for `epoch_id`
    pub fn set_winner(
        &mut self,
        epoch_id: u64,
        winner: Commitment,
        now_ms: u64,
    ) -> Result<(), CacheError> {
        let status = match &self.contents.entry {
            Some(entry) if entry.epoch_id == epoch_id => entry.status,
            _ => PoolStatus::SelectingWinner,
        };
        self.contents.entry = Some(CacheEntry {
            epoch_id,
            status,
            winner_commitment: Some(winner),
            updated_at_ms: now_ms,
        });
        info!(epoch_id, winner = %winner.short(), "cached winner commitment");
        self.save()
    }

    /// Remember a submitted deposit. Re-recording the same commitment is a
    /// no-op.
    pub fn record_deposit(&mut self, record: DepositRecord) -> Result<(), CacheError> {
        if self
            .contents
            .deposits
            .iter()
            .any(|r| r.commitment == record.commitment)
        {
            return Ok(());
        }
        self.contents.deposits.push(record);
        self.save()
    }

    fn save(&self) -> Result<(), CacheError> {
        write_json(&self.path, &self.contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultEntry {
    epoch_id: u64,
    amount: u64,
    secret: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultContents {
    secrets: Vec<VaultEntry>,
}

/// Persisted deposit secrets.
///
/// Only used when the wallet signs non-deterministically and a secret
/// cannot be re-derived. Losing this file loses access to those deposits.
#[derive(Debug)]
pub struct SecretVault {
    path: PathBuf,
    contents: VaultContents,
}

impl SecretVault {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let contents = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, contents })
    }

    /// Stored secret for `(epoch_id, amount)`, if any
    pub fn lookup(&self, epoch_id: u64, amount: u64) -> Result<Option<Secret>, CacheError> {
        self.contents
            .secrets
            .iter()
            .find(|e| e.epoch_id == epoch_id && e.amount == amount)
            .map(|e| Secret::from_hex(&e.secret).map_err(CacheError::from))
            .transpose()
    }

    /// Stored secret for `(epoch_id, amount)`, creating and persisting a
    /// random one on first use
    pub fn open_or_create(&mut self, epoch_id: u64, amount: u64) -> Result<Secret, CacheError> {
        if let Some(secret) = self.lookup(epoch_id, amount)? {
            return Ok(secret);
        }

        let mut bytes = [0u8; SECRET_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        let secret = Secret::from_bytes(bytes);

        self.contents.secrets.push(VaultEntry {
            epoch_id,
            amount,
            secret: secret.to_hex(),
        });
        write_json(&self.path, &self.contents)?;
        info!(epoch_id, amount, "persisted new deposit secret");
        Ok(secret)
    }

    pub fn len(&self) -> usize {
        self.contents.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.secrets.is_empty()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    if !path.exists() {
        debug!(path = %path.display(), "no file yet");
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Replace `path` with `value` atomically: the JSON is written and synced
/// to a sibling temp file, then renamed over the target.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let io_error = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json_data = serde_json::to_string_pretty(value).map_err(|source| CacheError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    // Same directory as the target so the rename never crosses filesystems
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
    staged.write_all(json_data.as_bytes()).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    staged.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
