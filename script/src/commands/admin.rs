//! Administrative console.
//!
//! Writes the local fallback cache that stands in for the datum when the
//! chain cannot be read. It never touches the chain.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;

use veilpot_lib::commitment::Commitment;
use veilpot_lib::datum::PoolStatus;

use super::print_header;
use crate::cache::LocalCache;
use crate::config::Config;
use crate::flows::now_ms;

/// Administrative overrides for the local fallback cache
#[derive(Args, Debug)]
pub struct AdminCommand {
    #[command(subcommand)]
    pub action: AdminAction,
}

#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// Record the pool status for an epoch
    SetStatus {
        #[arg(long, short = 'e')]
        epoch: u64,

        /// collecting, staking, selecting-winner, distributing or completed
        #[arg(long, short = 's')]
        status: PoolStatus,
    },
    /// Record the winning commitment for an epoch
    SetWinner {
        #[arg(long, short = 'e')]
        epoch: u64,

        /// Winning commitment, hex
        #[arg(long, short = 'c')]
        commitment: Commitment,
    },
}

impl AdminCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header("🛠️ Veilpot - Admin");
        let mut cache = LocalCache::open(&config.cache_path)?;

        match &self.action {
            AdminAction::SetStatus { epoch, status } => {
                cache.set_status(*epoch, *status, now_ms())?;
                println!(
                    "{} Epoch {} status set to {}",
                    "✅".bright_green(),
                    epoch,
                    status.to_string().bright_cyan()
                );
            }
            AdminAction::SetWinner { epoch, commitment } => {
                cache.set_winner(*epoch, *commitment, now_ms())?;
                println!(
                    "{} Epoch {} winner set to {}...",
                    "✅".bright_green(),
                    epoch,
                    commitment.short().bright_yellow()
                );
            }
        }
        println!(
            "{} The on-chain datum always takes precedence over these values.",
            "ℹ️".bright_blue()
        );
        Ok(())
    }
}
