//! Lifecycle session
//!
//! A [`Session`] owns the deposits and upload jobs of one account and coordinates them
//! against the ledger and the storage service. Every mutation of a deposit or job happens
//! under the session state lock and is published to the status stream while the lock is
//! held, so all subscribers observe the same order of transitions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stowage_common::parking_lot::Mutex;
use stowage_common::pub_sub::Pubsub;
use stowage_common::state::check_upload_state_transition;
use stowage_common::{
    AccountId, Amount, Balance, Deposit, DepositOutcome, DepositState, Error, Ledger,
    ProgressStage, StorageService, UploadFailure, UploadJob, UploadState,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

mod balance_cache;
mod builder;
mod config;
mod deposit;
mod events;
mod funding;
mod upload;
mod wait;

pub use balance_cache::BalanceCache;
pub use builder::SessionBuilder;
pub use config::{Pricing, SessionConfig, TopUpPolicy};
pub use events::{SessionEvent, SessionSubscription, SessionTopic};
pub use upload::Artifact;

/// Notifications kept for deposits the session has not recorded yet
const MAX_PARKED_NOTIFICATIONS: usize = 100;

/// Point-in-time view of the session account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account address
    pub id: AccountId,
    /// Deposits submitted in this session
    pub deposits: Vec<Deposit>,
    /// Cached balance, `None` when never fetched or stale
    pub balance: Option<Balance>,
}

struct JobEntry {
    job: UploadJob,
    cancel: CancellationToken,
}

#[derive(Default)]
pub(crate) struct SessionState {
    deposits: Vec<Deposit>,
    jobs: Vec<JobEntry>,
    parked: VecDeque<(String, DepositOutcome)>,
    /// Deposits submitted to the ledger but not recorded yet
    in_flight_deposits: usize,
}

impl SessionState {
    fn job_mut(&mut self, job_id: Uuid) -> Result<&mut JobEntry, Error> {
        self.jobs
            .iter_mut()
            .find(|entry| entry.job.id == job_id)
            .ok_or(Error::UnknownJob)
    }

    fn park(&mut self, external_ref: String, outcome: DepositOutcome) {
        if self.parked.len() >= MAX_PARKED_NOTIFICATIONS {
            if let Some((dropped, _)) = self.parked.pop_front() {
                tracing::debug!("Dropping parked deposit notification for {}", dropped);
            }
        }
        self.parked.push_back((external_ref, outcome));
    }

    fn take_parked(&mut self, external_ref: &str) -> Option<DepositOutcome> {
        let index = self
            .parked
            .iter()
            .position(|(parked_ref, _)| parked_ref == external_ref)?;
        self.parked.remove(index).map(|(_, outcome)| outcome)
    }
}

pub(crate) struct SessionInner {
    pub(crate) account: AccountId,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) storage: Arc<dyn StorageService>,
    pub(crate) config: SessionConfig,
    pub(crate) balance_cache: Arc<BalanceCache>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) event_manager: Pubsub<SessionEvent>,
    /// Bumped after every deposit resolution
    pub(crate) deposit_updates: watch::Sender<u64>,
    pub(crate) shutdown: CancellationToken,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn has_pending_deposits(&self) -> bool {
        let state = self.state.lock();
        state.in_flight_deposits > 0
            || state
                .deposits
                .iter()
                .any(|deposit| deposit.state == DepositState::Pending)
    }

    /// Move a job to `new_state`, apply `update` and publish the resulting snapshot
    pub(crate) fn transition_job<F>(
        &self,
        job_id: Uuid,
        new_state: UploadState,
        update: F,
    ) -> Result<UploadJob, Error>
    where
        F: FnOnce(&mut UploadJob),
    {
        let mut state = self.state.lock();
        self.transition_job_locked(&mut state, job_id, new_state, update)
    }

    /// Same as [`SessionInner::transition_job`] with the state lock already held
    fn transition_job_locked<F>(
        &self,
        state: &mut SessionState,
        job_id: Uuid,
        new_state: UploadState,
        update: F,
    ) -> Result<UploadJob, Error>
    where
        F: FnOnce(&mut UploadJob),
    {
        let entry = state.job_mut(job_id)?;

        check_upload_state_transition(entry.job.state, new_state)?;

        entry.job.state = new_state;
        if let Some(stage) = ProgressStage::for_state(new_state) {
            entry.job.progress_stage = entry.job.progress_stage.max(stage);
        }
        update(&mut entry.job);

        let snapshot = entry.job.clone();
        tracing::info!(
            "Upload {} is {} ({})",
            snapshot.id,
            snapshot.state,
            snapshot.progress_stage
        );
        self.event_manager.publish(snapshot.clone());

        Ok(snapshot)
    }

    /// Record a terminal failure for a job
    pub(crate) fn fail_job(&self, job_id: Uuid, failure: UploadFailure) -> Result<UploadJob, Error> {
        let reason = failure.to_string();
        let job = self.transition_job(job_id, UploadState::Failed, |job| {
            job.failure = Some(failure);
        })?;
        tracing::warn!("Upload {} failed: {}", job_id, reason);

        Ok(job)
    }

    fn insert_job(&self, job: UploadJob, cancel: CancellationToken) {
        let mut state = self.state.lock();
        state.jobs.push(JobEntry {
            job: job.clone(),
            cancel,
        });
        tracing::info!("Upload {} queued with cost {}", job.id, job.cost);
        self.event_manager.publish(job);
    }
}

/// Upload lifecycle session for one account
///
/// Cheap to clone; clones share the same state and status stream.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.inner.account)
            .field("config", &self.inner.config)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl Session {
    /// Account this session acts for
    pub fn account_id(&self) -> &AccountId {
        &self.inner.account
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Balance cache shared by the session's jobs
    pub fn balance_cache(&self) -> Arc<BalanceCache> {
        self.inner.balance_cache.clone()
    }

    /// Account balance, served from the cache when fresh
    #[instrument(skip(self))]
    pub async fn balance(&self) -> Result<Balance, Error> {
        self.inner
            .balance_cache
            .get_balance(&self.inner.account)
            .await
    }

    /// Account balance, always fetched from the ledger
    #[instrument(skip(self))]
    pub async fn refresh_balance(&self) -> Result<Balance, Error> {
        self.inner
            .balance_cache
            .invalidate(&self.inner.account)
            .await;
        self.balance().await
    }

    /// Available balance minus funds reserved by in-flight jobs
    pub async fn effective_balance(&self) -> Result<Amount, Error> {
        self.inner
            .balance_cache
            .effective_available(&self.inner.account)
            .await
    }

    /// Account view with the cached balance
    pub async fn account(&self) -> AccountSnapshot {
        let balance = self.inner.balance_cache.cached(&self.inner.account).await;

        AccountSnapshot {
            id: self.inner.account.clone(),
            deposits: self.deposits(),
            balance,
        }
    }

    /// Deposits in submission order
    pub fn deposits(&self) -> Vec<Deposit> {
        self.inner.state.lock().deposits.clone()
    }

    /// Upload jobs in submission order
    pub fn uploads(&self) -> Vec<UploadJob> {
        self.inner
            .state
            .lock()
            .jobs
            .iter()
            .map(|entry| entry.job.clone())
            .collect()
    }

    /// Snapshot of one upload job
    pub fn job(&self, job_id: Uuid) -> Result<UploadJob, Error> {
        self.inner
            .state
            .lock()
            .jobs
            .iter()
            .find(|entry| entry.job.id == job_id)
            .map(|entry| entry.job.clone())
            .ok_or(Error::UnknownJob)
    }

    /// Snapshot of one deposit
    pub fn deposit_by_id(&self, deposit_id: Uuid) -> Result<Deposit, Error> {
        self.inner
            .state
            .lock()
            .deposits
            .iter()
            .find(|deposit| deposit.id == deposit_id)
            .cloned()
            .ok_or(Error::UnknownDeposit)
    }

    /// Whether a deposit is still waiting for its outcome
    pub fn has_pending_deposits(&self) -> bool {
        self.inner.has_pending_deposits()
    }

    /// Cost estimate for an artifact of `size` bytes
    pub fn estimate_cost(&self, size: u64) -> Result<Amount, Error> {
        self.inner.config.pricing.estimate(size)
    }

    /// Whether [`Session::shutdown`] was called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop the deposit listener and end every subscription
    ///
    /// Jobs still fingerprinting are cancelled; jobs waiting for funds fail.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        tracing::info!("Shutting down session for {}", self.inner.account);
        self.inner.shutdown.cancel();
        self.inner.event_manager.close();
    }
}
