use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use stowage::{
    Amount, Artifact, Session, SessionEvent, SessionTopic, UploadJob, UploadState,
};
use uuid::Uuid;

#[derive(Args)]
pub struct UploadSubCommand {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Fixed cost per file, estimated from the file size when omitted
    #[arg(short, long)]
    cost: Option<u64>,
    /// Deposit this amount before uploading
    #[arg(short, long)]
    deposit: Option<u64>,
    /// Seconds to wait for all uploads to finish
    #[arg(short, long, default_value_t = 300)]
    timeout: u64,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

pub async fn upload(session: &Session, sub_command_args: &UploadSubCommand) -> Result<()> {
    // Subscribe before submitting so no transition is missed
    let mut subscription = session.subscribe(vec![SessionTopic::All])?;

    if let Some(amount) = sub_command_args.deposit {
        session.deposit(Amount::from(amount)).await?;
    }

    let mut waiting: HashSet<Uuid> = HashSet::new();
    for path in &sub_command_args.files {
        let artifact = Artifact::from_path(path);
        let job = match sub_command_args.cost {
            Some(cost) => session.submit(artifact, Amount::from(cost))?,
            None => session.submit_estimated(artifact).await?,
        };
        waiting.insert(job.id);
    }

    let mut failed = 0;
    let result = tokio::time::timeout(Duration::from_secs(sub_command_args.timeout), async {
        while let Some(event) = subscription.recv().await {
            print_event(&event, sub_command_args.json)?;

            if let SessionEvent::Upload(job) = event {
                if job.state.is_terminal() && waiting.remove(&job.id) {
                    if job.state == UploadState::Failed {
                        failed += 1;
                    }
                    if waiting.is_empty() {
                        break;
                    }
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .await;

    match result {
        Ok(inner) => inner?,
        Err(_) => bail!("{} upload(s) still running after timeout", waiting.len()),
    }

    if failed > 0 {
        bail!("{failed} upload(s) failed");
    }

    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        SessionEvent::Deposit(deposit) => {
            println!("deposit {} {} {}", deposit.id, deposit.amount, deposit.state)
        }
        SessionEvent::Upload(job) => println!("{}", describe_job(job)),
    }

    Ok(())
}

fn describe_job(job: &UploadJob) -> String {
    let mut line = format!(
        "upload {} {} [{}] {}",
        job.id, job.name, job.progress_stage, job.state
    );

    if let Some(provider_ref) = &job.provider_ref {
        line.push_str(&format!(" provider={provider_ref}"));
    }
    if let Some(settlement_ref) = &job.settlement_ref {
        line.push_str(&format!(" settlement={settlement_ref}"));
    }
    if let Some(failure) = &job.failure {
        line.push_str(&format!(" error=\"{failure}\""));
    }

    line
}
