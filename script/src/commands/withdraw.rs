use anyhow::Result;
use clap::Args;
use colored::*;
use dialoguer::{Confirm, Input};

use veilpot_lib::proof::Role;

use super::{format_coin_amount, indexer, load_wallet, parse_coin_amount, print_header, spinner};
use crate::cache::{LocalCache, SecretVault};
use crate::config::Config;
use crate::flows::PoolSession;
use crate::prover::ProofEngine;

/// Withdraw a deposit once the pool is distributing
#[derive(Args, Debug)]
pub struct WithdrawCommand {
    /// Amount originally deposited, in whole coins
    #[arg(long, short = 'a')]
    pub amount: Option<String>,

    /// Epoch the deposit was made in (defaults to the current chain epoch)
    #[arg(long, short = 'e')]
    pub epoch: Option<u64>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl WithdrawCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header("🏦 Veilpot - Withdraw");

        let amount_raw = match &self.amount {
            Some(amount) => amount.clone(),
            None => Input::new()
                .with_prompt(format!("{} Amount you deposited", "💰".bright_yellow()))
                .interact_text()?,
        };
        let amount = parse_coin_amount(&amount_raw)?;

        let pool_address = config.require_pool_address()?;
        let wallet = load_wallet(config)?;
        let indexer = indexer(config);
        let prover = ProofEngine::new(config.prover_url.as_deref());

        if !self.yes {
            let epoch = self
                .epoch
                .map(|e| e.to_string())
                .unwrap_or_else(|| "current".to_string());
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "{} Withdraw the {} deposit from epoch {}?",
                    "⚠️".bright_yellow(),
                    format_coin_amount(amount).bright_red().bold(),
                    epoch
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

        let pb = spinner("Reconciling pool, proving and submitting...");
        let receipt = session.withdraw(self.epoch, amount).await;
        pb.finish_and_clear();
        let receipt = receipt?;

        println!();
        match receipt.role {
            Role::Winner => println!(
                "{} {}",
                "🏆".bright_yellow(),
                "Your deposit won this round!".bright_yellow().bold()
            ),
            _ => println!(
                "{} {}",
                "🎉".bright_green(),
                "Principal returned.".bright_green().bold()
            ),
        }
        println!("{} {}", "Epoch:".bright_white(), receipt.epoch_id);
        println!("{} {}", "Payout:".bright_white(), format_coin_amount(receipt.payout));
        println!("{} {}...", "Commitment:".bright_white(), receipt.commitment.short());
        println!("{} {}", "Transaction:".bright_white(), receipt.tx_id.bright_cyan());
        Ok(())
    }
}
