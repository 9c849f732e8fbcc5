//! Upload operation
//!
//! [`Session::submit`] validates the request, records a `Queued` job and hands it to a
//! driver task. The driver runs the commit, placement and settlement stages through
//! [`saga::UploadSaga`] and records the terminal outcome on the job.

use std::path::PathBuf;
use std::sync::Arc;

use stowage_common::{
    ensure_stowage, task, Amount, Error, Fingerprint, UploadFailure, UploadJob, UploadState,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use self::saga::UploadSaga;
use super::{Session, SessionInner};

pub(crate) mod saga;

/// Content to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// In-memory content
    Bytes {
        /// Display name
        name: String,
        /// Content
        data: Vec<u8>,
    },
    /// File read by the commit stage
    File(PathBuf),
}

impl Artifact {
    /// In-memory artifact
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File artifact
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Display name
    pub fn name(&self) -> String {
        match self {
            Self::Bytes { name, .. } => name.clone(),
            Self::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// Size in bytes, reads file metadata for file artifacts
    pub async fn size(&self) -> Result<u64, Error> {
        match self {
            Self::Bytes { data, .. } => Ok(data.len() as u64),
            Self::File(path) => tokio::fs::metadata(path)
                .await
                .map(|metadata| metadata.len())
                .map_err(|err| Error::FingerprintError(format!("{}: {err}", path.display()))),
        }
    }

    /// Content fingerprint
    pub(crate) async fn fingerprint(&self) -> Result<Fingerprint, Error> {
        match self {
            Self::Bytes { data, .. } => Fingerprint::from_bytes(data),
            Self::File(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|err| Error::FingerprintError(format!("{}: {err}", path.display())))?;
                Fingerprint::from_bytes(&data)
            }
        }
    }
}

impl Session {
    /// Start an upload
    ///
    /// Returns the `Queued` job right away; progress is reported through the status stream.
    /// An empty in-memory artifact or a zero cost is rejected without creating a job.
    #[instrument(skip(self, artifact))]
    pub fn submit(&self, artifact: Artifact, cost: Amount) -> Result<UploadJob, Error> {
        ensure_stowage!(!self.inner.is_closed(), Error::SessionClosed);
        ensure_stowage!(cost > Amount::ZERO, Error::InvalidAmount(cost));
        if let Artifact::Bytes { data, .. } = &artifact {
            ensure_stowage!(
                !data.is_empty(),
                Error::FingerprintError("artifact is empty".to_string())
            );
        }

        let job = UploadJob::new(artifact.name(), cost);
        let cancel = self.inner.shutdown.child_token();

        self.inner.insert_job(job.clone(), cancel.clone());

        task::spawn(drive_upload(
            self.inner.clone(),
            job.id,
            cost,
            artifact,
            cancel,
        ));

        Ok(job)
    }

    /// Start an upload priced with the configured [`super::Pricing`]
    #[instrument(skip(self, artifact))]
    pub async fn submit_estimated(&self, artifact: Artifact) -> Result<UploadJob, Error> {
        let cost = self.estimate_cost(artifact.size().await?)?;
        self.submit(artifact, cost)
    }

    /// Cancel a job that has not been fingerprinted yet
    ///
    /// Only `Queued` and `Submitting` jobs can be cancelled; the job ends `Failed` with
    /// [`UploadFailure::Cancelled`].
    #[instrument(skip(self))]
    pub fn cancel(&self, job_id: Uuid) -> Result<UploadJob, Error> {
        let mut state = self.inner.state.lock();
        let entry = state.job_mut(job_id)?;

        if !entry.job.state.is_cancellable() {
            return Err(Error::InvalidCancellation(entry.job.state));
        }
        entry.cancel.cancel();

        tracing::info!("Cancelling upload {}", job_id);
        self.inner
            .transition_job_locked(&mut state, job_id, UploadState::Failed, |job| {
                job.failure = Some(UploadFailure::Cancelled);
            })
    }
}

#[instrument(skip(inner, artifact, cancel))]
async fn drive_upload(
    inner: Arc<SessionInner>,
    job_id: Uuid,
    cost: Amount,
    artifact: Artifact,
    cancel: CancellationToken,
) {
    let saga = UploadSaga::new(inner.clone(), job_id, cost, cancel);

    let result = async {
        let committed = saga.commit(&artifact).await?;
        let placed = committed.place().await?;
        placed.settle().await
    }
    .await;

    match result {
        Ok(finalized) => {
            let job = finalized.into_job();
            tracing::info!(
                "Upload {} settled as {}",
                job.id,
                job.settlement_ref.as_deref().unwrap_or_default()
            );
        }
        Err(err) => {
            if let Err(state_err) = inner.fail_job(job_id, UploadFailure::from(&err)) {
                tracing::debug!(
                    "Upload {} already final, dropping error {}: {}",
                    job_id,
                    err,
                    state_err
                );
            }
        }
    }
}
