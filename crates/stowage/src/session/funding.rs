//! Funding gate in front of placement

use stowage_common::{Amount, Error};
use tracing::instrument;
use uuid::Uuid;

use super::{SessionInner, TopUpPolicy};

impl SessionInner {
    /// Reserve `cost` for `job_id`, waiting for pending deposits or topping up as configured
    ///
    /// On success the reservation is held in the balance cache and must be released or
    /// settled by the caller.
    #[instrument(skip(self))]
    pub(crate) async fn ensure_funds(&self, job_id: Uuid, cost: Amount) -> Result<(), Error> {
        let mut topped_up = false;

        loop {
            // subscribe before checking so a resolution in between is not missed
            let mut updates = self.deposit_updates.subscribe();

            let (available, required) = match self
                .balance_cache
                .reserve(&self.account, job_id, cost)
                .await
            {
                Ok(()) => return Ok(()),
                Err(Error::InsufficientFunds {
                    available,
                    required,
                }) => (available, required),
                Err(err) => return Err(err),
            };

            if self.has_pending_deposits() {
                tracing::info!(
                    "Upload {} deferred until a pending deposit resolves ({} of {} available)",
                    job_id,
                    available,
                    required
                );
            } else if self.config.top_up == TopUpPolicy::Shortfall && !topped_up {
                let shortfall = required.saturating_sub(available);
                tracing::info!("Topping up {} for upload {}", shortfall, job_id);

                self.deposit(shortfall).await.map_err(|err| {
                    Error::PlacementRejected(format!("top-up of {shortfall} failed: {err}"))
                })?;
                topped_up = true;
            } else {
                return Err(Error::InsufficientFunds {
                    available,
                    required,
                });
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::SessionClosed),
                changed = tokio::time::timeout(self.config.funding_timeout(), updates.changed()) => {
                    match changed {
                        Ok(Ok(())) => {
                            tracing::debug!("Deposit resolved, re-checking funds for {}", job_id);
                        }
                        Ok(Err(_)) => return Err(Error::SessionClosed),
                        Err(_) => {
                            return Err(Error::PlacementRejected(
                                "timed out waiting for pending deposit".to_string(),
                            ))
                        }
                    }
                }
            }
        }
    }
}
