use anyhow::Result;
use clap::Args;
use colored::*;
use dialoguer::{Confirm, Input};

use super::{format_coin_amount, indexer, load_wallet, parse_coin_amount, print_header, spinner};
use crate::cache::{LocalCache, SecretVault};
use crate::config::Config;
use crate::flows::{PoolSession, SecretSource};
use crate::prover::{ProofEngine, ProofOrigin};

/// Deposit into the current pool round
#[derive(Args, Debug)]
pub struct DepositCommand {
    /// Amount to deposit, in whole coins (e.g. 50 or 12.5)
    #[arg(long, short = 'a')]
    pub amount: Option<String>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl DepositCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header("💰 Veilpot - Deposit");

        let amount_raw = match &self.amount {
            Some(amount) => amount.clone(),
            None => Input::new()
                .with_prompt(format!("{} Amount to deposit", "💰".bright_yellow()))
                .interact_text()?,
        };
        let amount = parse_coin_amount(&amount_raw)?;

        let pool_address = config.require_pool_address()?;
        let wallet = load_wallet(config)?;
        let indexer = indexer(config);
        let prover = ProofEngine::new(config.prover_url.as_deref());

        println!();
        println!("{}", "📋 Deposit Details".bright_green().bold());
        println!("{}", "─".repeat(30).bright_black());
        println!("{} {}", "Amount:".bright_white(), format_coin_amount(amount));
        println!("{} {}", "Pool:".bright_white(), pool_address.bright_cyan());

        if !self.yes {
            println!();
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "{} Sign and submit this deposit?",
                    "⚠️".bright_yellow()
                ))
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{} Operation cancelled by user", "🚫".bright_red());
                return Ok(());
            }
        }

        let mut session = PoolSession {
            wallet: &wallet,
            indexer: &indexer,
            prover: &prover,
            pool_address,
            cache: LocalCache::open(&config.cache_path)?,
            vault: SecretVault::open(&config.vault_path)?,
        };

        let pb = spinner("Deriving secret, proving and submitting...");
        let receipt = session.deposit(amount).await;
        pb.finish_and_clear();
        let receipt = receipt?;

        println!();
        println!(
            "{} {}",
            "🎉".bright_green(),
            "Deposit submitted!".bright_green().bold()
        );
        println!("{} {}", "Epoch:".bright_white(), receipt.epoch_id);
        println!("{} {}", "Commitment:".bright_white(), receipt.commitment.to_hex().bright_yellow());
        println!("{} {}", "Transaction:".bright_white(), receipt.tx_id.bright_cyan());
        let prover_name = match receipt.proof_origin {
            ProofOrigin::Remote => "proof service",
            ProofOrigin::Local => "local construction",
        };
        println!("{} {}", "Proof:".bright_white(), prover_name);

        match receipt.secret_source {
            SecretSource::WalletSignature => println!(
                "{} Your secret is re-derived from your wallet at withdrawal time; nothing to back up.",
                "ℹ️".bright_blue()
            ),
            SecretSource::Vault => println!(
                "{} Your wallet signs non-deterministically. Back up {} or this deposit cannot be withdrawn.",
                "⚠️".bright_yellow(),
                config.vault_path.display().to_string().bright_red()
            ),
        }
        Ok(())
    }
}
