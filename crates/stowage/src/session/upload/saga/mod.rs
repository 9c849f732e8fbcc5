//! Upload Saga - Type State Pattern Implementation
//!
//! Drives one upload job through its three stages. Each stage is only callable on the
//! state the previous stage produced.
//!
//! # Type State Flow
//!
//! ```text
//! UploadSaga<Queued>
//!   └─> commit() -> UploadSaga<Committed>
//!         └─> place() -> UploadSaga<Placed>
//!               └─> settle() -> UploadSaga<Finalized>
//! ```
//!
//! The placement stage reserves the job's cost in the balance cache and registers a
//! compensation releasing it. Settlement consumes the reservation whatever its outcome.

use std::fmt;
use std::sync::Arc;

use stowage_common::{Amount, Error, UploadJob, UploadState};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use self::compensation::{
    add_compensation, clear_compensations, execute_compensations, Compensations,
    ReleaseReservation,
};
use self::state::{Committed, Finalized, Placed, Queued};
use super::Artifact;
use crate::session::SessionInner;

pub(crate) mod compensation;
pub(crate) mod state;

/// Saga pattern implementation for upload jobs.
pub(crate) struct UploadSaga<S> {
    /// Session the job belongs to
    inner: Arc<SessionInner>,
    /// Compensating actions in LIFO order (most recent first)
    compensations: Compensations,
    /// State-specific data
    state_data: S,
}

impl UploadSaga<Queued> {
    /// Create a new saga for a recorded `Queued` job.
    pub fn new(
        inner: Arc<SessionInner>,
        job_id: Uuid,
        cost: Amount,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            compensations: Compensations::new(),
            state_data: Queued {
                job_id,
                cost,
                cancel,
            },
        }
    }

    /// Fingerprint the artifact.
    ///
    /// Moves the job `Queued -> Submitting -> Placing`. Aborts with [`Error::Cancelled`]
    /// if the job is cancelled while the artifact is read.
    #[instrument(skip_all)]
    pub async fn commit(self, artifact: &Artifact) -> Result<UploadSaga<Committed>, Error> {
        let UploadSaga {
            inner,
            compensations,
            state_data:
                Queued {
                    job_id,
                    cost,
                    cancel,
                },
        } = self;

        inner.transition_job(job_id, UploadState::Submitting, |_| {})?;

        let fingerprint = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            fingerprint = artifact.fingerprint() => fingerprint?,
        };

        tracing::debug!("Upload {} fingerprinted as {}", job_id, fingerprint);

        inner.transition_job(job_id, UploadState::Placing, |job| {
            job.artifact_ref = Some(fingerprint);
        })?;

        Ok(UploadSaga {
            inner,
            compensations,
            state_data: Committed {
                job_id,
                cost,
                fingerprint,
            },
        })
    }
}

impl UploadSaga<Committed> {
    /// Reserve funds and place the artifact with a provider.
    ///
    /// Moves the job `Placing -> Placed`. On failure the reservation is released before
    /// the error is returned.
    #[instrument(skip_all)]
    pub async fn place(self) -> Result<UploadSaga<Placed>, Error> {
        let UploadSaga {
            inner,
            mut compensations,
            state_data:
                Committed {
                    job_id,
                    cost,
                    fingerprint,
                },
        } = self;

        inner.ensure_funds(job_id, cost).await?;

        add_compensation(
            &mut compensations,
            Box::new(ReleaseReservation {
                balance_cache: inner.balance_cache.clone(),
                account: inner.account.clone(),
                job_id,
            }),
        );

        let placed = async {
            let provider_ref = timeout(
                inner.config.placement_timeout(),
                inner.storage.place(&fingerprint, cost),
            )
            .await
            .map_err(|_| Error::PlacementTimeout)??;

            inner.transition_job(job_id, UploadState::Placed, |job| {
                job.provider_ref = Some(provider_ref.clone());
            })?;

            Ok::<_, Error>(provider_ref)
        }
        .await;

        match placed {
            Ok(provider_ref) => {
                tracing::debug!("Upload {} placed as {}", job_id, provider_ref);
                Ok(UploadSaga {
                    inner,
                    compensations,
                    state_data: Placed {
                        job_id,
                        cost,
                        provider_ref,
                    },
                })
            }
            Err(err) => {
                tracing::warn!(
                    "Placement of upload {} failed: {}. Running compensations.",
                    job_id,
                    err
                );
                execute_compensations(&mut compensations).await;
                Err(err)
            }
        }
    }
}

impl UploadSaga<Placed> {
    /// Settle payment for the placement.
    ///
    /// Moves the job `Placed -> Settling -> Done`. The reservation is dropped and the
    /// balance marked stale after the settlement attempt, successful or not.
    #[instrument(skip_all)]
    pub async fn settle(self) -> Result<UploadSaga<Finalized>, Error> {
        let UploadSaga {
            inner,
            mut compensations,
            state_data:
                Placed {
                    job_id,
                    cost,
                    provider_ref,
                },
        } = self;

        if let Err(err) = inner.transition_job(job_id, UploadState::Settling, |_| {}) {
            execute_compensations(&mut compensations).await;
            return Err(err);
        }

        let settled = timeout(
            inner.config.settlement_timeout(),
            inner.ledger.settle(&inner.account, &provider_ref, cost),
        )
        .await
        .map_err(|_| Error::SettlementTimeout)
        .and_then(|settled| settled);

        inner
            .balance_cache
            .settle_reservation(&inner.account, job_id)
            .await;
        clear_compensations(&mut compensations);

        let settlement_ref = settled?;

        let job = inner.transition_job(job_id, UploadState::Done, |job| {
            job.settlement_ref = Some(settlement_ref);
        })?;

        Ok(UploadSaga {
            inner,
            compensations,
            state_data: Finalized { job },
        })
    }
}

impl UploadSaga<Finalized> {
    /// Final job snapshot
    pub fn into_job(self) -> UploadJob {
        self.state_data.job
    }
}

impl<S: fmt::Debug> fmt::Debug for UploadSaga<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSaga")
            .field("state_data", &self.state_data)
            .field("compensations", &self.compensations.len())
            .finish()
    }
}
