//! Veilpot CLI - a privacy-preserving no-loss lottery pool
//!
//! Usage:
//! ```shell
//! # Inspect the pool
//! cargo run --bin veilpot -- status --pool-address $POOL
//!
//! # Deposit 50 coins
//! cargo run --bin veilpot -- deposit --amount 50 --private-key $PRIVATE_KEY
//!
//! # Withdraw once the round is distributing
//! cargo run --bin veilpot -- withdraw --amount 50 --epoch 412
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use console::Term;
use std::process;
use tracing_subscriber::EnvFilter;

use veilpot_script::commands::{
    AdminCommand, DepositCommand, StatusCommand, VerifyProofCommand, WithdrawCommand,
};
use veilpot_script::config::GlobalOpts;
use veilpot_script::flows::FlowError;

#[derive(Parser)]
#[command(
    name = "veilpot",
    about = "🎲 Veilpot - Private no-loss lottery deposits",
    long_about = "Veilpot lets you join a staking lottery without linking your deposit to your withdrawal.\n\nFeatures:\n• Secrets derived from your wallet signature, nothing to back up\n• Pool state reconciled from the datum, the UTXO set and a local cache\n• Proofs from a proving service with a local fallback",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 📊 Show the reconciled pool state
    Status(StatusCommand),
    /// 💰 Deposit into the current round
    Deposit(DepositCommand),
    /// 🏦 Withdraw principal, plus yield if you won
    Withdraw(WithdrawCommand),
    /// 🔍 Verify a proof against a round root
    VerifyProof(VerifyProofCommand),
    /// 🛠️ Override pool status or winner in the local cache
    Admin(AdminCommand),
}

fn print_banner() {
    let term = Term::stdout();
    let _ = term.clear_screen();

    println!(
        "{}",
        r#"
    ██╗   ██╗███████╗██╗██╗     ██████╗  ██████╗ ████████╗
    ██║   ██║██╔════╝██║██║     ██╔══██╗██╔═══██╗╚══██╔══╝
    ██║   ██║█████╗  ██║██║     ██████╔╝██║   ██║   ██║
    ╚██╗ ██╔╝██╔══╝  ██║██║     ██╔═══╝ ██║   ██║   ██║
     ╚████╔╝ ███████╗██║███████╗██║     ╚██████╔╝   ██║
      ╚═══╝  ╚══════╝╚═╝╚══════╝╚═╝      ╚═════╝    ╚═╝
    "#
        .bright_magenta()
        .bold()
    );
    println!("{}", "    Save together, win privately".bright_cyan().italic());
    println!("{}", "    ═══════════════════════════════════════════".bright_black());
    println!();
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let quiet = matches!(&cli.command, Commands::Status(status) if status.json);
    if !quiet {
        print_banner();
    }

    let result = match cli.global.resolve() {
        Ok(config) => match &cli.command {
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Deposit(cmd) => cmd.execute(&config).await,
            Commands::Withdraw(cmd) => cmd.execute(&config).await,
            Commands::VerifyProof(cmd) => cmd.execute(&config).await,
            Commands::Admin(cmd) => cmd.execute(&config).await,
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => {
            if !quiet {
                println!();
                println!(
                    "{} {}",
                    "✨".bright_green(),
                    "Operation completed successfully!".bright_green().bold()
                );
            }
        }
        Err(e) => {
            println!();
            eprintln!(
                "{} {}",
                "💥".bright_red(),
                "Operation failed!".bright_red().bold()
            );
            if let Some(flow) = e.downcast_ref::<FlowError>() {
                eprintln!(
                    "{} {} {}",
                    "📋".bright_yellow(),
                    "Error class:".bright_yellow(),
                    flow.class().to_string().bright_yellow()
                );
            }
            eprintln!("   {}", format!("{e:#}").bright_red());
            println!();
            eprintln!("{} {}", "💡".bright_blue(), "Tips:".bright_blue().bold());
            eprintln!("   • Check that --pool-address points at the pool script");
            eprintln!("   • Ensure your indexer key is valid and the indexer is reachable");
            eprintln!("   • Run with --verbose for detailed logs");

            process::exit(1);
        }
    }
}
