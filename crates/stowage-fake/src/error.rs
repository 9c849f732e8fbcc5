//! Fake Backend Error

use stowage_common::Amount;
use thiserror::Error;

/// Fake Backend Error
#[derive(Debug, Error)]
pub enum Error {
    /// Backend switched to unreachable
    #[error("{0} unreachable")]
    Unreachable(&'static str),
    /// Deposit of nothing
    #[error("Deposit amount must be positive")]
    ZeroDeposit,
    /// Funding source cannot cover the deposit
    #[error("Source funds exhausted: remaining `{remaining}`, requested `{requested}`")]
    SourceFundsExhausted {
        /// Funds left in the source
        remaining: Amount,
        /// Requested deposit
        requested: Amount,
    },
    /// Unknown or already resolved deposit reference
    #[error("Unknown pending deposit `{0}`")]
    UnknownDeposit(String),
    /// Account cannot pay the settlement
    #[error("Insufficient funds: available `{available}`, required `{required}`")]
    Underfunded {
        /// Available funds
        available: Amount,
        /// Settlement amount
        required: Amount,
    },
    /// Injected settlement rejection
    #[error("{0}")]
    SettlementRejected(String),
    /// No provider configured
    #[error("No provider configured")]
    NoProvider,
    /// Injected placement rejection
    #[error("{0}")]
    PlacementRejected(String),
}

impl From<Error> for stowage_common::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Unreachable(_) => Self::UnreachableService(e.to_string()),
            Error::ZeroDeposit | Error::SourceFundsExhausted { .. } => {
                Self::RejectedByLedger(e.to_string())
            }
            Error::UnknownDeposit(_) => Self::Custom(e.to_string()),
            Error::Underfunded { .. } | Error::SettlementRejected(_) => {
                Self::SettlementRejected(e.to_string())
            }
            Error::NoProvider => Self::NoProviderAvailable,
            Error::PlacementRejected(reason) => Self::PlacementRejected(reason),
        }
    }
}
