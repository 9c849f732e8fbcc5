use std::time::Duration;

use anyhow::Result;
use clap::Args;
use stowage::{Amount, Session};

#[derive(Args)]
pub struct DepositSubCommand {
    /// Amount to deposit
    amount: u64,
    /// Wait for the deposit to confirm
    #[arg(short, long)]
    wait: bool,
    /// Seconds to wait for confirmation
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

pub async fn deposit(session: &Session, sub_command_args: &DepositSubCommand) -> Result<()> {
    let deposit = session
        .deposit(Amount::from(sub_command_args.amount))
        .await?;

    println!(
        "Deposit {} submitted: {}",
        deposit.id,
        deposit.external_ref.as_deref().unwrap_or_default()
    );

    if sub_command_args.wait {
        let deposit = session
            .wait_for_deposit(deposit.id, Duration::from_secs(sub_command_args.timeout))
            .await?;
        println!("Deposit {} {}", deposit.id, deposit.state);

        let balance = session.refresh_balance().await?;
        println!("Available: {}", balance.available);
    }

    Ok(())
}
