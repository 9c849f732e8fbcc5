//! Stowage command line upload tool

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stowage::{AccountId, Session, SessionBuilder};
use stowage_fake::{FakeLedger, FakeStorage};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod config;
mod sub_commands;

const DEFAULT_WORK_DIR: &str = ".stowage";

/// Upload files to paid remote storage
#[derive(Parser)]
#[command(name = "stowage-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Account address, overrides the config file
    #[arg(short, long)]
    account: Option<String>,
    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account balance
    Balance,
    /// Fund the account
    Deposit(sub_commands::deposit::DepositSubCommand),
    /// Upload files
    Upload(sub_commands::upload::UploadSubCommand),
    /// Print fingerprint and estimated cost of files
    Fingerprint(sub_commands::fingerprint::FingerprintSubCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();
    let default_filter = args.log_level;

    let env_filter = EnvFilter::new(format!("{default_filter}"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = config::Settings::new(args.config.clone());

    let account = AccountId::from_str(args.account.as_deref().unwrap_or(&settings.account))?;

    let ledger = Arc::new(FakeLedger::new(settings.fake_ledger.clone()));
    ledger.credit(&account, settings.initial_balance).await;
    let storage = Arc::new(FakeStorage::new(settings.fake_storage.clone()));

    let session = SessionBuilder::new()
        .account(account)
        .ledger(ledger)
        .storage(storage)
        .config(settings.session.clone())
        .build()
        .await?;

    let result = run(&session, &args.command).await;
    session.shutdown();

    result
}

async fn run(session: &Session, command: &Commands) -> Result<()> {
    match command {
        Commands::Balance => sub_commands::balance::balance(session).await,
        Commands::Deposit(sub_command_args) => {
            sub_commands::deposit::deposit(session, sub_command_args).await
        }
        Commands::Upload(sub_command_args) => {
            sub_commands::upload::upload(session, sub_command_args).await
        }
        Commands::Fingerprint(sub_command_args) => {
            sub_commands::fingerprint::fingerprint(session, sub_command_args).await
        }
    }
}
