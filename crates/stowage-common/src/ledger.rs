//! Ledger capability
//!
//! The ledger holds account balances, accepts deposits and settles placements. Any
//! chain or payment rail can back a session as long as it implements [`Ledger`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, Balance, Error};

/// Final outcome of a submitted deposit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DepositOutcome {
    /// Credited to the account
    Confirmed,
    /// Not credited
    Failed(String),
}

/// Asynchronous deposit resolution delivered by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositNotification {
    /// Reference returned by [`Ledger::submit_deposit`]
    pub external_ref: String,
    /// Outcome
    pub outcome: DepositOutcome,
}

/// Ledger trait
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read the funded balance of an account
    ///
    /// Fails with [`Error::UnreachableService`] when the ledger cannot be reached.
    async fn query_balance(&self, account: &AccountId) -> Result<Balance, Error>;

    /// Submit a funding transaction
    ///
    /// Returns the transaction reference once accepted, or
    /// [`Error::RejectedByLedger`] when refused outright.
    async fn submit_deposit(&self, account: &AccountId, amount: Amount) -> Result<String, Error>;

    /// Stream of deposit resolutions
    ///
    /// Every call returns an independent stream starting from the next notification.
    async fn wait_deposit_event(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = DepositNotification> + Send>>, Error>;

    /// Settle payment for a placement
    ///
    /// Returns the settlement reference, or [`Error::SettlementRejected`].
    async fn settle(
        &self,
        account: &AccountId,
        placement_ref: &str,
        amount: Amount,
    ) -> Result<String, Error>;
}
