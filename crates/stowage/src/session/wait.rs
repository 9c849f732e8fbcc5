use stowage_common::{Deposit, DepositState, Error, UploadJob};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use super::{Session, SessionEvent, SessionTopic};

impl Session {
    /// Wait until an upload job reaches `Done` or `Failed`
    ///
    /// Resolves with the terminal snapshot, whatever the outcome. Fails with
    /// [`Error::Timeout`] if the job is still running after `timeout_duration`.
    pub async fn wait_for_upload(
        &self,
        job_id: Uuid,
        timeout_duration: Duration,
    ) -> Result<UploadJob, Error> {
        let mut subscription = self.subscribe(vec![SessionTopic::Upload(job_id)])?;

        let current = self.job(job_id)?;
        if current.state.is_terminal() {
            return Ok(current);
        }

        timeout(timeout_duration, async {
            while let Some(event) = subscription.recv().await {
                if let SessionEvent::Upload(job) = event {
                    if job.state.is_terminal() {
                        return Ok(job);
                    }
                }
            }
            Err(Error::SessionClosed)
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Wait until a deposit is confirmed or failed
    ///
    /// A failed deposit resolves with [`Error::DepositFailed`].
    pub async fn wait_for_deposit(
        &self,
        deposit_id: Uuid,
        timeout_duration: Duration,
    ) -> Result<Deposit, Error> {
        let mut subscription = self.subscribe(vec![SessionTopic::Deposit(deposit_id)])?;

        let current = self.deposit_by_id(deposit_id)?;
        let resolved = if current.state.is_terminal() {
            current
        } else {
            timeout(timeout_duration, async {
                while let Some(event) = subscription.recv().await {
                    if let SessionEvent::Deposit(deposit) = event {
                        if deposit.state.is_terminal() {
                            return Ok(deposit);
                        }
                    }
                }
                Err(Error::SessionClosed)
            })
            .await
            .map_err(|_| Error::Timeout)??
        };

        match resolved.state {
            DepositState::Failed => Err(resolved.error().unwrap_or(Error::DepositFailed {
                reason: String::new(),
            })),
            _ => Ok(resolved),
        }
    }
}
