//! Per-account balance cache with fund reservations
//!
//! Balances are fetched from the ledger on demand and cached until invalidated. The cache
//! also keeps the funds earmarked by in-flight upload jobs, so two jobs can never reserve
//! the same funds: every reservation re-validates against the cached balance under the
//! cache lock, refreshing it first if it went stale.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use stowage_common::{AccountId, Amount, Balance, Error, Ledger};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Default)]
struct CacheEntry {
    balance: Option<Balance>,
    stale: bool,
    reservations: HashMap<Uuid, Amount>,
}

impl CacheEntry {
    fn reserved(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(self.reservations.values().copied())?)
    }

    async fn refresh_if_stale(
        &mut self,
        ledger: &dyn Ledger,
        account: &AccountId,
    ) -> Result<Balance, Error> {
        match self.balance {
            Some(balance) if !self.stale => Ok(balance),
            _ => {
                let balance = ledger.query_balance(account).await?;
                tracing::debug!(
                    "Fetched balance for {}: available {} locked {} as of {}",
                    account,
                    balance.available,
                    balance.locked,
                    balance.as_of
                );
                self.balance = Some(balance);
                self.stale = false;
                Ok(balance)
            }
        }
    }
}

/// Balance cache keyed by account
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct BalanceCache {
    ledger: Arc<dyn Ledger>,
    entries: Mutex<HashMap<AccountId, CacheEntry>>,
}

impl fmt::Debug for BalanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceCache").finish_non_exhaustive()
    }
}

impl BalanceCache {
    /// Create a new, empty cache in front of `ledger`
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Last known balance, fetched from the ledger if missing or stale
    #[instrument(skip(self))]
    pub async fn get_balance(&self, account: &AccountId) -> Result<Balance, Error> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(account.clone())
            .or_default()
            .refresh_if_stale(self.ledger.as_ref(), account)
            .await
    }

    /// Same as [`BalanceCache::get_balance`] for an unparsed account address
    pub async fn get_balance_for(&self, account: &str) -> Result<Balance, Error> {
        let account = AccountId::from_str(account)?;
        self.get_balance(&account).await
    }

    /// Cached balance without touching the ledger, `None` if never fetched or stale
    pub async fn cached(&self, account: &AccountId) -> Option<Balance> {
        let entries = self.entries.lock().await;
        entries
            .get(account)
            .filter(|entry| !entry.stale)
            .and_then(|entry| entry.balance)
    }

    /// Mark the entry stale so the next read refetches it
    #[instrument(skip(self))]
    pub async fn invalidate(&self, account: &AccountId) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(account) {
            entry.stale = true;
        }
    }

    /// Available balance minus every outstanding reservation
    pub async fn effective_available(&self, account: &AccountId) -> Result<Amount, Error> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(account.clone()).or_default();
        let balance = entry
            .refresh_if_stale(self.ledger.as_ref(), account)
            .await?;

        Ok(balance.available.saturating_sub(entry.reserved()?))
    }

    /// Sum of outstanding reservations
    pub async fn reserved(&self, account: &AccountId) -> Result<Amount, Error> {
        let entries = self.entries.lock().await;
        match entries.get(account) {
            Some(entry) => entry.reserved(),
            None => Ok(Amount::ZERO),
        }
    }

    /// Earmark `cost` for `job`
    ///
    /// Fails with [`Error::InsufficientFunds`] when the refreshed available balance minus
    /// the other reservations does not cover `cost`. Reserving again for the same job
    /// replaces its previous reservation.
    #[instrument(skip(self))]
    pub async fn reserve(&self, account: &AccountId, job: Uuid, cost: Amount) -> Result<(), Error> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(account.clone()).or_default();
        let balance = entry
            .refresh_if_stale(self.ledger.as_ref(), account)
            .await?;

        let reserved_by_others = Amount::try_sum(
            entry
                .reservations
                .iter()
                .filter(|(id, _)| **id != job)
                .map(|(_, amount)| *amount),
        )?;
        let available = balance.available.saturating_sub(reserved_by_others);

        if available < cost {
            tracing::debug!(
                "Cannot reserve {} for job {}: {} available after reservations",
                cost,
                job,
                available
            );
            return Err(Error::InsufficientFunds {
                available,
                required: cost,
            });
        }

        entry.reservations.insert(job, cost);
        tracing::debug!("Reserved {} for job {}", cost, job);

        Ok(())
    }

    /// Drop the reservation of `job`, returns whether one existed
    #[instrument(skip(self))]
    pub async fn release(&self, account: &AccountId, job: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        entries
            .get_mut(account)
            .and_then(|entry| entry.reservations.remove(&job))
            .is_some()
    }

    /// Drop the reservation of `job` and mark the balance stale in one step
    ///
    /// Used once the ledger may have debited the reserved funds.
    #[instrument(skip(self))]
    pub async fn settle_reservation(&self, account: &AccountId, job: Uuid) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(account) {
            entry.reservations.remove(&job);
            entry.stale = true;
        }
    }
}
