use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;

use veilpot_lib::proof::{verify, Proof, RoundRoot};

use super::{indexer, print_header};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::reconciler::reconcile_pool;

/// Verify a proof against a round root
#[derive(Args, Debug)]
pub struct VerifyProofCommand {
    /// Proof bytes, hex
    #[arg(long)]
    pub proof: String,

    /// Round root, hex (read from the pool datum when omitted)
    #[arg(long)]
    pub round_root: Option<String>,

    /// Epoch whose datum supplies the round root
    #[arg(long, short = 'e')]
    pub epoch: Option<u64>,
}

impl VerifyProofCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header("🔍 Veilpot - Verify Proof");

        let proof = Proof::from_hex(&self.proof).context("could not parse proof")?;
        let round_root = match &self.round_root {
            Some(hex) => RoundRoot::from_hex(hex).context("could not parse round root")?,
            None => {
                let pool_address = config.require_pool_address()?;
                let cache = LocalCache::open(&config.cache_path)?;
                let reconciliation =
                    reconcile_pool(&indexer(config), pool_address, &cache, self.epoch).await?;
                reconciliation
                    .round_root()
                    .context("no on-chain datum carries a round root for this epoch")?
            }
        };

        let inputs = proof.public_inputs();
        println!("{} {}", "Commitment:".bright_white(), inputs.commitment.to_hex());
        println!("{} {}", "Role:".bright_white(), inputs.role);
        println!("{} {}", "Round root:".bright_white(), round_root.to_hex());
        println!();

        if !verify(&proof, &round_root) {
            println!("{} {}", "❌".bright_red(), "Proof does NOT verify".bright_red().bold());
            bail!("proof verification failed");
        }
        println!("{} {}", "✅".bright_green(), "Proof verifies".bright_green().bold());
        Ok(())
    }
}
