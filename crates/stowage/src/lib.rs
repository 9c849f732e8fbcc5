//! Upload lifecycle coordinator for paid remote storage.
//!
//! A [`Session`] drives the full workflow for one account: balance check, funding deposits,
//! artifact fingerprinting, placement with a storage provider and payment settlement on the
//! ledger. Every state transition is pushed to subscribers of the session's status stream.
//!
//! The ledger and the storage service are external collaborators, plugged in through the
//! [`Ledger`] and [`StorageService`] traits.
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod session;

pub use session::{
    AccountSnapshot, Artifact, BalanceCache, Pricing, Session, SessionBuilder, SessionConfig,
    SessionEvent, SessionSubscription, SessionTopic, TopUpPolicy,
};
/// Re-export common types
pub use stowage_common::{
    amount, ensure_stowage, error, pub_sub, state, AccountId, Amount, Balance, Deposit,
    DepositNotification, DepositOutcome, DepositState, Error, Fingerprint, Ledger,
    ProgressStage, StorageService, UploadFailure, UploadJob, UploadState,
};

/// Re-export futures::Stream
pub use futures::{Stream, StreamExt};
