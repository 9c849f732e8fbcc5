//! In-memory ledger

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use stowage_common::{
    task, AccountId, Amount, Balance, DepositNotification, DepositOutcome, Ledger,
};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Error;
use crate::jittered_delay;

/// Buffered notifications per listener
const NOTIFICATION_CHANNEL_SIZE: usize = 1024;

/// Fake ledger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeLedgerConfig {
    /// Resolve deposits on their own after a random delay
    pub auto_confirm: bool,
    /// Lower bound of the confirmation delay
    pub min_delay_ms: u64,
    /// Upper bound of the confirmation delay
    pub max_delay_ms: u64,
    /// Delay of every settlement
    pub settlement_delay_ms: u64,
    /// Funds the depositor can draw from, unlimited when unset
    pub source_funds: Option<Amount>,
}

impl Default for FakeLedgerConfig {
    fn default() -> Self {
        Self {
            auto_confirm: true,
            min_delay_ms: 0,
            max_delay_ms: 0,
            settlement_delay_ms: 0,
            source_funds: None,
        }
    }
}

/// Settlement recorded by [`FakeLedger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Paying account
    pub account: AccountId,
    /// Placement being paid
    pub placement_ref: String,
    /// Amount debited
    pub amount: Amount,
    /// Returned reference
    pub settlement_ref: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountEntry {
    available: Amount,
    locked: Amount,
}

#[derive(Debug)]
struct PendingDeposit {
    external_ref: String,
    account: AccountId,
    amount: Amount,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, AccountEntry>,
    pending: Vec<PendingDeposit>,
    source_remaining: Option<Amount>,
    clock: u64,
    settlements: Vec<Settlement>,
}

impl LedgerState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Debug)]
struct LedgerInner {
    config: FakeLedgerConfig,
    state: Mutex<LedgerState>,
    sender: broadcast::Sender<DepositNotification>,
    unreachable: AtomicBool,
    balance_queries: AtomicUsize,
    failing_deposits: Mutex<Option<String>>,
    rejected_settlements: Mutex<Option<String>>,
    settlement_delay: Mutex<Duration>,
}

impl LedgerInner {
    fn ensure_reachable(&self) -> Result<(), Error> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Unreachable("Ledger"));
        }
        Ok(())
    }

    /// Apply the outcome of a pending deposit and notify listeners
    async fn resolve(&self, external_ref: &str, outcome: DepositOutcome) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            let index = state
                .pending
                .iter()
                .position(|pending| pending.external_ref == external_ref)
                .ok_or_else(|| Error::UnknownDeposit(external_ref.to_string()))?;
            let pending = state.pending.remove(index);

            let entry = state.accounts.entry(pending.account.clone()).or_default();
            entry.locked = entry.locked.saturating_sub(pending.amount);
            match &outcome {
                DepositOutcome::Confirmed => {
                    entry.available = entry
                        .available
                        .checked_add(pending.amount)
                        .unwrap_or(entry.available);
                }
                DepositOutcome::Failed(_) => {
                    if let Some(remaining) = state.source_remaining.as_mut() {
                        *remaining = remaining.checked_add(pending.amount).unwrap_or(*remaining);
                    }
                }
            }
            state.tick();
        }

        tracing::debug!(
            "Fake ledger resolved {}, confirmed: {}",
            external_ref,
            outcome == DepositOutcome::Confirmed
        );
        self.notify(DepositNotification {
            external_ref: external_ref.to_string(),
            outcome,
        });

        Ok(())
    }

    fn notify(&self, notification: DepositNotification) {
        // no listener is not an error
        let _ = self.sender.send(notification);
    }
}

/// In-memory [`Ledger`]
///
/// Deposits are credited when they resolve. Settlements debit the available balance.
#[derive(Debug)]
pub struct FakeLedger {
    inner: Arc<LedgerInner>,
    confirmations_cancel_token: CancellationToken,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new(FakeLedgerConfig::default())
    }
}

impl Drop for FakeLedger {
    fn drop(&mut self) {
        self.confirmations_cancel_token.cancel();
    }
}

impl FakeLedger {
    /// Create new [`FakeLedger`]
    pub fn new(config: FakeLedgerConfig) -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let settlement_delay = Duration::from_millis(config.settlement_delay_ms);

        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState {
                    source_remaining: config.source_funds,
                    ..Default::default()
                }),
                config,
                sender,
                unreachable: AtomicBool::new(false),
                balance_queries: AtomicUsize::new(0),
                failing_deposits: Mutex::new(None),
                rejected_settlements: Mutex::new(None),
                settlement_delay: Mutex::new(settlement_delay),
            }),
            confirmations_cancel_token: CancellationToken::new(),
        }
    }

    /// Add funds to an account directly
    pub async fn credit(&self, account: &AccountId, amount: Amount) {
        let mut state = self.inner.state.lock().await;
        let entry = state.accounts.entry(account.clone()).or_default();
        entry.available = entry.available.checked_add(amount).unwrap_or(entry.available);
        state.tick();
    }

    /// Make every call fail with `UnreachableService`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Resolve future automatic confirmations as failed with `reason`
    pub async fn fail_deposits(&self, reason: Option<String>) {
        *self.inner.failing_deposits.lock().await = reason;
    }

    /// Reject every settlement with `reason`
    pub async fn reject_settlements(&self, reason: Option<String>) {
        *self.inner.rejected_settlements.lock().await = reason;
    }

    /// Delay every settlement
    pub async fn set_settlement_delay(&self, delay: Duration) {
        *self.inner.settlement_delay.lock().await = delay;
    }

    /// Confirm a pending deposit by hand
    pub async fn confirm(&self, external_ref: &str) -> Result<(), Error> {
        self.inner
            .resolve(external_ref, DepositOutcome::Confirmed)
            .await
    }

    /// Fail a pending deposit by hand
    pub async fn fail(&self, external_ref: &str, reason: &str) -> Result<(), Error> {
        self.inner
            .resolve(external_ref, DepositOutcome::Failed(reason.to_string()))
            .await
    }

    /// Send a raw notification, without touching balances
    ///
    /// Replaying a resolved reference simulates a duplicate confirmation.
    pub fn notify(&self, notification: DepositNotification) {
        self.inner.notify(notification);
    }

    /// References of unresolved deposits, oldest first
    pub async fn pending_deposits(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .await
            .pending
            .iter()
            .map(|pending| pending.external_ref.clone())
            .collect()
    }

    /// Settlements made so far
    pub async fn settlements(&self) -> Vec<Settlement> {
        self.inner.state.lock().await.settlements.clone()
    }

    /// Number of `query_balance` calls served
    pub fn balance_queries(&self) -> usize {
        self.inner.balance_queries.load(Ordering::SeqCst)
    }

    fn schedule_confirmation(&self, external_ref: String) {
        let inner = self.inner.clone();
        let cancel = self.confirmations_cancel_token.clone();
        let delay = jittered_delay(self.inner.config.min_delay_ms, self.inner.config.max_delay_ms);

        task::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Dropping scheduled confirmation of {}", external_ref);
                }
                _ = time::sleep(delay) => {
                    let outcome = match inner.failing_deposits.lock().await.clone() {
                        Some(reason) => DepositOutcome::Failed(reason),
                        None => DepositOutcome::Confirmed,
                    };
                    if let Err(err) = inner.resolve(&external_ref, outcome).await {
                        tracing::debug!("Scheduled confirmation skipped: {}", err);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    #[instrument(skip(self))]
    async fn query_balance(&self, account: &AccountId) -> Result<Balance, stowage_common::Error> {
        self.inner.ensure_reachable()?;
        self.inner.balance_queries.fetch_add(1, Ordering::SeqCst);

        let state = self.inner.state.lock().await;
        let entry = state.accounts.get(account).copied().unwrap_or_default();

        Ok(Balance {
            available: entry.available,
            locked: entry.locked,
            as_of: state.clock,
        })
    }

    #[instrument(skip(self))]
    async fn submit_deposit(
        &self,
        account: &AccountId,
        amount: Amount,
    ) -> Result<String, stowage_common::Error> {
        self.inner.ensure_reachable()?;
        if amount == Amount::ZERO {
            return Err(Error::ZeroDeposit.into());
        }

        let external_ref = format!("0x{}", Uuid::new_v4().simple());

        {
            let mut state = self.inner.state.lock().await;
            if let Some(remaining) = state.source_remaining {
                let left = remaining
                    .checked_sub(amount)
                    .ok_or(Error::SourceFundsExhausted {
                        remaining,
                        requested: amount,
                    })?;
                state.source_remaining = Some(left);
            }

            let entry = state.accounts.entry(account.clone()).or_default();
            entry.locked = entry.locked.checked_add(amount).unwrap_or(entry.locked);
            state.pending.push(PendingDeposit {
                external_ref: external_ref.clone(),
                account: account.clone(),
                amount,
            });
            state.tick();
        }

        tracing::debug!("Fake ledger accepted deposit {} of {}", external_ref, amount);

        if self.inner.config.auto_confirm {
            self.schedule_confirmation(external_ref.clone());
        }

        Ok(external_ref)
    }

    async fn wait_deposit_event(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = DepositNotification> + Send>>, stowage_common::Error>
    {
        self.inner.ensure_reachable()?;
        tracing::info!("Starting stream for fake deposit notifications");

        let stream = BroadcastStream::new(self.inner.sender.subscribe()).filter_map(
            |notification| async move {
                match notification {
                    Ok(notification) => Some(notification),
                    Err(err) => {
                        tracing::warn!("Deposit notification listener lagged: {}", err);
                        None
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self))]
    async fn settle(
        &self,
        account: &AccountId,
        placement_ref: &str,
        amount: Amount,
    ) -> Result<String, stowage_common::Error> {
        self.inner.ensure_reachable()?;

        let delay = *self.inner.settlement_delay.lock().await;
        if !delay.is_zero() {
            time::sleep(delay).await;
        }

        if let Some(reason) = self.inner.rejected_settlements.lock().await.clone() {
            return Err(Error::SettlementRejected(reason).into());
        }

        let mut state = self.inner.state.lock().await;
        let entry = state.accounts.entry(account.clone()).or_default();
        entry.available = entry
            .available
            .checked_sub(amount)
            .ok_or(Error::Underfunded {
                available: entry.available,
                required: amount,
            })?;

        let settlement_ref = format!("settlement-{}", state.settlements.len() + 1);
        state.settlements.push(Settlement {
            account: account.clone(),
            placement_ref: placement_ref.to_string(),
            amount,
            settlement_ref: settlement_ref.clone(),
        });
        state.tick();

        Ok(settlement_ref)
    }
}
