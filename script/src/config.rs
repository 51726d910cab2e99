//! Global CLI configuration.
//!
//! Every option can come from the command line, the environment, or a
//! `.env` file loaded before parsing. Values written as `$NAME` are expanded
//! from the environment so secrets can be passed by reference.

use clap::Args;
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_INDEXER_URL: &str = "https://cardano-preprod.blockfrost.io/api/v0";
pub const DEFAULT_CACHE_FILENAME: &str = "veilpot.cache.json";
pub const DEFAULT_VAULT_FILENAME: &str = "veilpot.priv";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} not found")]
    MissingEnvVar(String),

    #[error("missing required setting --{flag} (or {env})")]
    Missing {
        flag: &'static str,
        env: &'static str,
    },
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Chain indexer base URL
    #[arg(long, global = true, env = "VEILPOT_INDEXER_URL", default_value = DEFAULT_INDEXER_URL)]
    pub indexer_url: String,

    /// Chain indexer project key
    #[arg(long, global = true, env = "VEILPOT_INDEXER_KEY", hide_env_values = true)]
    pub indexer_key: Option<String>,

    /// Script address holding the pool
    #[arg(long, global = true, env = "VEILPOT_POOL_ADDRESS")]
    pub pool_address: Option<String>,

    /// Remote proving service (local proofs when unset or unreachable)
    #[arg(long, global = true, env = "VEILPOT_PROVER_URL")]
    pub prover_url: Option<String>,

    /// Transaction submission endpoint
    #[arg(long, global = true, env = "VEILPOT_SUBMIT_URL")]
    pub submit_url: Option<String>,

    /// Local fallback cache written by the admin console
    #[arg(long, global = true, env = "VEILPOT_CACHE", default_value = DEFAULT_CACHE_FILENAME)]
    pub cache_path: PathBuf,

    /// Persisted secrets for wallets with randomized signatures
    #[arg(long, global = true, env = "VEILPOT_VAULT", default_value = DEFAULT_VAULT_FILENAME)]
    pub vault_path: PathBuf,

    /// Signing key (will prompt if not provided)
    #[arg(long, short = 'p', global = true, env = "VEILPOT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

/// Settings after `$VAR` expansion
#[derive(Debug, Clone)]
pub struct Config {
    pub indexer_url: String,
    pub indexer_key: Option<String>,
    pub pool_address: Option<String>,
    pub prover_url: Option<String>,
    pub submit_url: Option<String>,
    pub cache_path: PathBuf,
    pub vault_path: PathBuf,
    pub private_key: Option<String>,
}

impl GlobalOpts {
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        Ok(Config {
            indexer_url: expand_env_vars(&self.indexer_url)?,
            indexer_key: expand_optional(self.indexer_key.as_deref())?,
            pool_address: expand_optional(self.pool_address.as_deref())?,
            prover_url: expand_optional(self.prover_url.as_deref())?,
            submit_url: expand_optional(self.submit_url.as_deref())?,
            cache_path: self.cache_path.clone(),
            vault_path: self.vault_path.clone(),
            private_key: expand_optional(self.private_key.as_deref())?,
        })
    }
}

impl Config {
    pub fn require_pool_address(&self) -> Result<&str, ConfigError> {
        self.pool_address.as_deref().ok_or(ConfigError::Missing {
            flag: "pool-address",
            env: "VEILPOT_POOL_ADDRESS",
        })
    }
}

/// Expand environment variables in a string (e.g., "$PRIVATE_KEY" -> actual value)
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    match input.strip_prefix('$') {
        Some(var_name) => {
            let value =
                env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
            debug!(variable = var_name, "expanded environment variable");
            Ok(value)
        }
        None => Ok(input.to_string()),
    }
}

fn expand_optional(input: Option<&str>) -> Result<Option<String>, ConfigError> {
    input.map(expand_env_vars).transpose()
}
