use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use stowage::{Fingerprint, Session};

#[derive(Args)]
pub struct FingerprintSubCommand {
    /// Files to fingerprint
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

pub async fn fingerprint(
    session: &Session,
    sub_command_args: &FingerprintSubCommand,
) -> Result<()> {
    for path in &sub_command_args.files {
        let data = tokio::fs::read(path).await?;
        let fingerprint = Fingerprint::from_bytes(&data)?;
        let cost = session.estimate_cost(data.len() as u64)?;

        println!("{fingerprint}  {cost}  {}", path.display());
    }

    Ok(())
}
