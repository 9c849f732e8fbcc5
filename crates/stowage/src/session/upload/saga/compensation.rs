//! Compensation actions for the upload saga.
//!
//! When a stage fails after acquiring something, the registered actions run in reverse
//! order (LIFO) to give it back.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_common::{AccountId, Error};
use tracing::instrument;
use uuid::Uuid;

use crate::session::BalanceCache;

/// Undo step registered by a saga stage
#[async_trait]
pub trait CompensatingAction: Send + Sync {
    /// Run the compensation
    async fn execute(&self) -> Result<(), Error>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Pending compensations, most recent first
pub type Compensations = VecDeque<Box<dyn CompensatingAction>>;

/// Register a compensation so it runs before the ones registered earlier
pub fn add_compensation(compensations: &mut Compensations, action: Box<dyn CompensatingAction>) {
    compensations.push_front(action);
}

/// Forget every compensation once the saga no longer needs them
pub fn clear_compensations(compensations: &mut Compensations) {
    compensations.clear();
}

/// Run every pending compensation, most recent first
///
/// A failing compensation is logged and does not stop the others.
pub async fn execute_compensations(compensations: &mut Compensations) {
    while let Some(action) = compensations.pop_front() {
        tracing::debug!("Running compensation {}", action.name());
        if let Err(err) = action.execute().await {
            tracing::error!("Compensation {} failed: {}", action.name(), err);
        }
    }
}

/// Compensation action to release the funds reserved for a job.
///
/// Registered once the placement stage holds a reservation in the balance cache, so a
/// failed or timed out placement frees the funds for other jobs.
pub struct ReleaseReservation {
    /// Cache holding the reservation
    pub balance_cache: Arc<BalanceCache>,
    /// Reserving account
    pub account: AccountId,
    /// Job that reserved the funds
    pub job_id: Uuid,
}

#[async_trait]
impl CompensatingAction for ReleaseReservation {
    #[instrument(skip_all)]
    async fn execute(&self) -> Result<(), Error> {
        tracing::info!(
            "Compensation: Releasing funds reserved by upload {}",
            self.job_id
        );

        if !self.balance_cache.release(&self.account, self.job_id).await {
            tracing::debug!("No reservation left for upload {}", self.job_id);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReleaseReservation"
    }
}
