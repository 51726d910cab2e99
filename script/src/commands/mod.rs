//! CLI subcommands

use anyhow::{bail, Context, Result};
use colored::*;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::config::Config;
use crate::indexer::HttpIndexer;
use crate::wallet::LocalKeyWallet;

pub mod admin;
pub mod deposit;
pub mod status;
pub mod verify_proof;
pub mod withdraw;

pub use admin::AdminCommand;
pub use deposit::DepositCommand;
pub use status::StatusCommand;
pub use verify_proof::VerifyProofCommand;
pub use withdraw::WithdrawCommand;

/// Base units per whole coin
pub const BASE_UNITS_PER_COIN: u64 = 1_000_000;

pub(crate) fn print_header(title: &str) {
    println!("{}", title.bright_magenta().bold());
    println!("{}", "═".repeat(50).bright_black());
    println!();
}

pub(crate) fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.magenta} {msg}");
    if let Ok(style) = style {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub(crate) fn indexer(config: &Config) -> HttpIndexer {
    HttpIndexer::new(config.indexer_url.clone(), config.indexer_key.clone())
}

/// Wallet from `--private-key`, prompting when it was not given
pub(crate) fn load_wallet(config: &Config) -> Result<LocalKeyWallet> {
    let private_key = match &config.private_key {
        Some(key) => key.clone(),
        None => {
            println!(
                "{} {}",
                "🔐".bright_blue(),
                "Private key required for signing".bright_cyan()
            );
            Password::new()
                .with_prompt("Enter your private key")
                .interact()?
        }
    };

    if !private_key.starts_with("0x") || private_key.len() != 66 {
        bail!("private key must be a 0x-prefixed 32-byte hex string");
    }

    let wallet = LocalKeyWallet::from_private_key(&private_key)?
        .with_submit_url(config.submit_url.clone())
        .with_indexer(indexer(config));
    Ok(wallet)
}

/// Parse a decimal coin amount ("12.5") into base units without floats
pub fn parse_coin_amount(input: &str) -> Result<u64> {
    let input = input.trim();
    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    if fraction.len() > 6 {
        bail!("at most 6 decimal places are supported");
    }
    if whole.is_empty() && fraction.is_empty() {
        bail!("empty amount");
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("invalid amount {input:?}"))?
    };
    let fraction: u64 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<6}");
        padded
            .parse()
            .with_context(|| format!("invalid amount {input:?}"))?
    };

    whole
        .checked_mul(BASE_UNITS_PER_COIN)
        .and_then(|units| units.checked_add(fraction))
        .context("amount too large")
}

pub fn format_coin_amount(base_units: u64) -> String {
    format!(
        "{}.{:06}",
        base_units / BASE_UNITS_PER_COIN,
        base_units % BASE_UNITS_PER_COIN
    )
}
