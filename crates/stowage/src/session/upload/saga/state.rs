//! State types for the upload saga.
//!
//! Each state holds what the next stage needs. A job id is carried throughout so every
//! stage records its transition on the right job.

use stowage_common::{Amount, Fingerprint, UploadJob};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Queued state - job recorded, nothing done yet.
#[derive(Debug)]
pub struct Queued {
    /// Job being driven
    pub job_id: Uuid,
    /// Cost to reserve and settle
    pub cost: Amount,
    /// Fires when the job is cancelled or the session shuts down
    pub cancel: CancellationToken,
}

/// Committed state - artifact fingerprinted, job is `Placing`.
#[derive(Debug)]
pub struct Committed {
    /// Job being driven
    pub job_id: Uuid,
    /// Cost to reserve and settle
    pub cost: Amount,
    /// Content fingerprint
    pub fingerprint: Fingerprint,
}

/// Placed state - provider accepted the artifact, cost reserved.
#[derive(Debug)]
pub struct Placed {
    /// Job being driven
    pub job_id: Uuid,
    /// Cost to settle
    pub cost: Amount,
    /// Provider placement reference
    pub provider_ref: String,
}

/// Finalized state - settlement recorded, job is `Done`.
#[derive(Debug)]
pub struct Finalized {
    /// Final job snapshot
    pub job: UploadJob,
}
