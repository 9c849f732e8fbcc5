//! Stowage shared types and functions.
//!
//! This crate is the base foundation to build things that can interact with a stowage
//! session: the coordinator in the `stowage` crate, ledger and storage backends, and
//! front-ends rendering the status stream.
//!
//! This is meant to contain the shared types, traits and common functions that are used across the
//! internal crates.

pub mod account;
pub mod amount;
pub mod error;
pub mod ledger;
pub mod pub_sub;
pub mod state;
pub mod storage;
pub mod task;
pub mod types;

// re-exporting external crates
pub use bitcoin::hashes;
pub use parking_lot;

pub use self::account::AccountId;
pub use self::amount::Amount;
pub use self::error::Error;
pub use self::ledger::{DepositNotification, DepositOutcome, Ledger};
pub use self::storage::StorageService;
pub use self::types::{
    Balance, Deposit, DepositState, Fingerprint, ProgressStage, UploadFailure, UploadJob,
    UploadState,
};

/// Return early with an error if a condition is not satisfied
#[macro_export]
macro_rules! ensure_stowage {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
