//! Session entity types

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha256, Hash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountId, Amount, Error};

/// Funded balance of an account as reported by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable funds
    pub available: Amount,
    /// Funds locked by the ledger
    pub locked: Amount,
    /// Logical timestamp of the ledger read
    pub as_of: u64,
}

/// Deposit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepositState {
    /// Accepted by the ledger, awaiting confirmation
    Pending,
    /// Confirmed and credited
    Confirmed,
    /// Rejected after acceptance
    Failed,
}

impl DepositState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Funding request against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit id
    pub id: Uuid,
    /// Funded account
    pub account: AccountId,
    /// Deposited amount
    pub amount: Amount,
    /// State
    pub state: DepositState,
    /// Ledger transaction reference
    pub external_ref: Option<String>,
    /// Failure reason reported by the ledger
    pub failure_reason: Option<String>,
}

impl Deposit {
    /// Error describing a failed deposit
    pub fn error(&self) -> Option<Error> {
        match self.state {
            DepositState::Failed => Some(Error::DepositFailed {
                reason: self.failure_reason.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Upload job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadState {
    /// Created, nothing done yet
    Queued,
    /// Fingerprint being computed
    Submitting,
    /// Fingerprinted, placement requested
    Placing,
    /// Placed with a provider
    Placed,
    /// Settlement requested
    Settling,
    /// Settled
    Done,
    /// Failed, see [`UploadJob::failure`]
    Failed,
}

impl UploadState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether the job can still be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Queued | Self::Submitting)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Submitting => write!(f, "SUBMITTING"),
            Self::Placing => write!(f, "PLACING"),
            Self::Placed => write!(f, "PLACED"),
            Self::Settling => write!(f, "SETTLING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Completed stage counter, 0 through 3
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressStage(u8);

impl ProgressStage {
    /// Nothing completed
    pub const NONE: Self = Self(0);
    /// Fingerprint computed
    pub const COMMITTED: Self = Self(1);
    /// Placed with a provider
    pub const PLACED: Self = Self(2);
    /// Settled
    pub const SETTLED: Self = Self(3);

    /// Stage reached when entering `state`, `None` for states that keep the current stage
    pub fn for_state(state: UploadState) -> Option<Self> {
        match state {
            UploadState::Queued | UploadState::Submitting => Some(Self::NONE),
            UploadState::Placing => Some(Self::COMMITTED),
            UploadState::Placed | UploadState::Settling => Some(Self::PLACED),
            UploadState::Done => Some(Self::SETTLED),
            UploadState::Failed => None,
        }
    }

    /// Stage as integer
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/3", self.0)
    }
}

/// Content fingerprint of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(sha256::Hash);

impl Fingerprint {
    /// Fingerprint of `data`
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::FingerprintError("artifact is empty".to_string()));
        }

        Ok(Self(sha256::Hash::hash(data)))
    }

    /// Raw digest
    pub fn to_byte_array(&self) -> [u8; 32] {
        self.0.to_byte_array()
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        sha256::Hash::from_str(s)
            .map(Self)
            .map_err(|e| Error::FingerprintError(e.to_string()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an upload job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum UploadFailure {
    /// Artifact could not be fingerprinted
    Fingerprint(String),
    /// No provider took the artifact
    NoProviderAvailable,
    /// Placement refused, including insufficient funds
    PlacementRejected(String),
    /// Placement timed out
    PlacementTimeout,
    /// Settlement timed out
    SettlementTimeout,
    /// Settlement refused
    SettlementRejected(String),
    /// A backend could not be reached
    UnreachableService(String),
    /// Cancelled by the caller
    Cancelled,
    /// Anything else
    Other(String),
}

impl From<&Error> for UploadFailure {
    fn from(err: &Error) -> Self {
        match err {
            Error::FingerprintError(reason) => Self::Fingerprint(reason.clone()),
            Error::NoProviderAvailable => Self::NoProviderAvailable,
            Error::PlacementRejected(reason) => Self::PlacementRejected(reason.clone()),
            Error::InsufficientFunds {
                available,
                required,
            } => Self::PlacementRejected(format!(
                "insufficient funds: available {available}, required {required}"
            )),
            Error::PlacementTimeout => Self::PlacementTimeout,
            Error::SettlementTimeout => Self::SettlementTimeout,
            Error::SettlementRejected(reason) => Self::SettlementRejected(reason.clone()),
            Error::UnreachableService(reason) => Self::UnreachableService(reason.clone()),
            Error::Cancelled => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<UploadFailure> for Error {
    fn from(failure: UploadFailure) -> Self {
        match failure {
            UploadFailure::Fingerprint(reason) => Error::FingerprintError(reason),
            UploadFailure::NoProviderAvailable => Error::NoProviderAvailable,
            UploadFailure::PlacementRejected(reason) => Error::PlacementRejected(reason),
            UploadFailure::PlacementTimeout => Error::PlacementTimeout,
            UploadFailure::SettlementTimeout => Error::SettlementTimeout,
            UploadFailure::SettlementRejected(reason) => Error::SettlementRejected(reason),
            UploadFailure::UnreachableService(reason) => Error::UnreachableService(reason),
            UploadFailure::Cancelled => Error::Cancelled,
            UploadFailure::Other(reason) => Error::Custom(reason),
        }
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fingerprint(reason) => write!(f, "fingerprint error: {reason}"),
            Self::NoProviderAvailable => write!(f, "no provider available"),
            Self::PlacementRejected(reason) => write!(f, "placement rejected: {reason}"),
            Self::PlacementTimeout => write!(f, "placement timed out"),
            Self::SettlementTimeout => write!(f, "settlement timed out"),
            Self::SettlementRejected(reason) => write!(f, "settlement rejected: {reason}"),
            Self::UnreachableService(reason) => write!(f, "service unreachable: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// One user-initiated upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    /// Job id
    pub id: Uuid,
    /// Display name of the artifact
    pub name: String,
    /// Estimated cost reserved for placement
    pub cost: Amount,
    /// Content fingerprint, set by the commit stage
    pub artifact_ref: Option<Fingerprint>,
    /// State
    pub state: UploadState,
    /// Completed stages
    pub progress_stage: ProgressStage,
    /// Provider placement reference
    pub provider_ref: Option<String>,
    /// Ledger settlement reference
    pub settlement_ref: Option<String>,
    /// Failure, set only in [`UploadState::Failed`]
    pub failure: Option<UploadFailure>,
}

impl UploadJob {
    /// New queued job
    pub fn new(name: String, cost: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            cost,
            artifact_ref: None,
            state: UploadState::Queued,
            progress_stage: ProgressStage::NONE,
            provider_ref: None,
            settlement_ref: None,
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_content_addressed() {
        let a = Fingerprint::from_bytes(b"hello world").unwrap();
        let b = Fingerprint::from_bytes(b"hello world").unwrap();
        let c = Fingerprint::from_bytes(b"hello world!").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a.to_string(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(Fingerprint::from_str(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn empty_artifact_has_no_fingerprint() {
        assert!(matches!(
            Fingerprint::from_bytes(&[]),
            Err(Error::FingerprintError(_))
        ));
    }

    #[test]
    fn stages_follow_states() {
        assert_eq!(
            ProgressStage::for_state(UploadState::Submitting),
            Some(ProgressStage::NONE)
        );
        assert_eq!(
            ProgressStage::for_state(UploadState::Placing),
            Some(ProgressStage::COMMITTED)
        );
        assert_eq!(
            ProgressStage::for_state(UploadState::Settling),
            Some(ProgressStage::PLACED)
        );
        assert_eq!(
            ProgressStage::for_state(UploadState::Done),
            Some(ProgressStage::SETTLED)
        );
        assert_eq!(ProgressStage::for_state(UploadState::Failed), None);
    }

    #[test]
    fn failure_round_trips_through_error() {
        let err = Error::InsufficientFunds {
            available: 10.into(),
            required: 60.into(),
        };
        let failure = UploadFailure::from(&err);
        assert!(matches!(
            Error::from(failure),
            Error::PlacementRejected(reason) if reason.contains("required 60")
        ));
    }
}
