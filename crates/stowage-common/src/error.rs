//! Errors

use thiserror::Error;

use crate::types::UploadState;
use crate::Amount;

/// Stowage Error
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger or storage service could not be reached
    #[error("Service unreachable: `{0}`")]
    UnreachableService(String),
    /// Account identifier is malformed
    #[error("Invalid account: `{0}`")]
    InvalidAccount(String),
    /// Amount must be greater than zero
    #[error("Invalid amount: `{0}`")]
    InvalidAmount(Amount),
    /// Ledger refused the deposit before accepting it
    #[error("Deposit rejected by ledger: `{0}`")]
    RejectedByLedger(String),
    /// Deposit was accepted but failed to confirm
    #[error("Deposit failed: `{reason}`")]
    DepositFailed {
        /// Reason reported by the ledger
        reason: String,
    },
    /// Artifact cannot be content addressed
    #[error("Fingerprint error: `{0}`")]
    FingerprintError(String),
    /// No storage provider accepted the placement
    #[error("No storage provider available")]
    NoProviderAvailable,
    /// Placement refused
    #[error("Placement rejected: `{0}`")]
    PlacementRejected(String),
    /// Placement did not answer within its timeout
    #[error("Placement timed out")]
    PlacementTimeout,
    /// Settlement did not answer within its timeout
    #[error("Settlement timed out")]
    SettlementTimeout,
    /// Settlement refused by the ledger
    #[error("Settlement rejected: `{0}`")]
    SettlementRejected(String),
    /// Not enough unreserved funds
    #[error("Insufficient funds: available `{available}`, required `{required}`")]
    InsufficientFunds {
        /// Funds available after reservations
        available: Amount,
        /// Funds required
        required: Amount,
    },
    /// Job can no longer be cancelled
    #[error("Upload cannot be cancelled in state `{0}`")]
    InvalidCancellation(UploadState),
    /// Operation cancelled before it committed any side effect
    #[error("Operation cancelled")]
    Cancelled,
    /// Job is unknown to this session
    #[error("Unknown upload job")]
    UnknownJob,
    /// Deposit is unknown to this session
    #[error("Unknown deposit")]
    UnknownDeposit,
    /// Waiting for an outcome timed out
    #[error("Timeout")]
    Timeout,
    /// Session has been shut down
    #[error("Session closed")]
    SessionClosed,
    /// State transition error
    #[error(transparent)]
    State(#[from] crate::state::Error),
    /// Pub-sub error
    #[error(transparent)]
    PubSub(#[from] crate::pub_sub::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Custom error
    #[error("`{0}`")]
    Custom(String),
}
