use anyhow::Result;
use stowage::Session;

pub async fn balance(session: &Session) -> Result<()> {
    let balance = session.balance().await?;

    println!("Account: {}", session.account_id());
    println!("Available: {}", balance.available);
    println!("Locked: {}", balance.locked);

    Ok(())
}
