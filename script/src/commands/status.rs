use anyhow::Result;
use clap::Args;
use colored::*;

use veilpot_lib::reconcile::{StateOrigin, YieldSource};

use super::{format_coin_amount, indexer, print_header, spinner};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::indexer::deposit_commitments;
use crate::reconciler::reconcile_pool;

/// Show the reconciled pool state
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Epoch to inspect (defaults to the current chain epoch)
    #[arg(long, short = 'e')]
    pub epoch: Option<u64>,

    /// Also list deposit commitments announced on chain
    #[arg(long)]
    pub participants: bool,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        let pool_address = config.require_pool_address()?;
        let indexer = indexer(config);
        let cache = LocalCache::open(&config.cache_path)?;

        let pb = spinner("Reading pool state...");
        let reconciliation = reconcile_pool(&indexer, pool_address, &cache, self.epoch).await;
        pb.finish_and_clear();
        let reconciliation = reconciliation?;
        let state = &reconciliation.state;

        if self.json {
            println!("{}", serde_json::to_string_pretty(state)?);
            return Ok(());
        }

        print_header("🎲 Veilpot - Pool Status");
        let source = match reconciliation.origin {
            StateOrigin::LedgerDatum => "on-chain datum".bright_green(),
            StateOrigin::UtxoSum => "UTXO sum (status not on chain)".bright_yellow(),
            StateOrigin::LocalCache => "local cache only".bright_red(),
        };
        println!("{} {}", "Epoch:".bright_white(), state.epoch_id);
        println!("{} {}", "Status:".bright_white(), state.status.to_string().bright_cyan());
        println!("{} {}", "Source:".bright_white(), source);
        println!(
            "{} {}",
            "Total deposited:".bright_white(),
            format_coin_amount(state.total_deposited)
        );
        println!("{} {}", "Participants:".bright_white(), state.participant_count);

        let yield_note = match state.yield_source {
            YieldSource::OnChain => "on chain".normal(),
            YieldSource::Estimated => "estimated".bright_black(),
        };
        println!(
            "{} {} ({})",
            "Yield:".bright_white(),
            format_coin_amount(state.yield_amount),
            yield_note
        );
        if let Some(end_ms) = state.epoch_end_ms {
            println!("{} {} ms", "Epoch end:".bright_white(), end_ms);
        }
        match &state.winner_commitment {
            Some(winner) => println!("{} {}...", "Winner:".bright_white(), winner.short().bright_yellow()),
            None => println!("{} {}", "Winner:".bright_white(), "not drawn".bright_black()),
        }
        if let Some(withdrawn) = reconciliation.withdrawn_set() {
            println!("{} {}", "Withdrawals:".bright_white(), withdrawn.len());
        }

        if self.participants {
            println!();
            println!("{}", "📋 Announced deposits".bright_green().bold());
            println!("{}", "─".repeat(30).bright_black());
            let commitments = deposit_commitments(&indexer, pool_address).await?;
            if commitments.is_empty() {
                println!("   {}", "none found".bright_black());
            }
            for commitment in commitments {
                println!("   {}", commitment.to_hex());
            }
        }
        Ok(())
    }
}
