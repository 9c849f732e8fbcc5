use std::pin::Pin;
use std::sync::{Arc, Weak};

use futures::{Stream, StreamExt};
use stowage_common::parking_lot::Mutex;
use stowage_common::pub_sub::Pubsub;
use stowage_common::{task, AccountId, DepositNotification, Error, Ledger, StorageService};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{BalanceCache, Session, SessionConfig, SessionInner, SessionState};

/// Builder for creating a new [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    account: Option<AccountId>,
    ledger: Option<Arc<dyn Ledger>>,
    storage: Option<Arc<dyn StorageService>>,
    config: SessionConfig,
    balance_cache: Option<Arc<BalanceCache>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("account", &self.account)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Create a new SessionBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the account
    pub fn account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    /// Set the ledger backend
    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the storage backend
    pub fn storage(mut self, storage: Arc<dyn StorageService>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the session settings
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Reuse an existing balance cache
    ///
    /// It must front the same ledger as the session.
    pub fn balance_cache(mut self, balance_cache: Arc<BalanceCache>) -> Self {
        self.balance_cache = Some(balance_cache);
        self
    }

    /// Build the session and start listening for deposit notifications
    pub async fn build(self) -> Result<Session, Error> {
        let account = self
            .account
            .ok_or(Error::Custom("Account required".to_string()))?;
        let ledger = self
            .ledger
            .ok_or(Error::Custom("Ledger required".to_string()))?;
        let storage = self
            .storage
            .ok_or(Error::Custom("Storage required".to_string()))?;

        let balance_cache = self
            .balance_cache
            .unwrap_or_else(|| Arc::new(BalanceCache::new(ledger.clone())));

        // subscribe before any deposit can be submitted
        let notifications = ledger.wait_deposit_event().await?;

        let (deposit_updates, _) = watch::channel(0);

        let inner = Arc::new(SessionInner {
            account,
            ledger,
            storage,
            config: self.config,
            balance_cache,
            state: Mutex::new(SessionState::default()),
            event_manager: Pubsub::new(),
            deposit_updates,
            shutdown: CancellationToken::new(),
        });

        spawn_deposit_listener(&inner, notifications);

        tracing::info!("Session started for {}", inner.account);

        Ok(Session { inner })
    }
}

fn spawn_deposit_listener(
    inner: &Arc<SessionInner>,
    mut notifications: Pin<Box<dyn Stream<Item = DepositNotification> + Send>>,
) {
    let session: Weak<SessionInner> = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();

    task::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Deposit listener stopped");
                    break;
                }
                notification = notifications.next() => {
                    let Some(notification) = notification else {
                        tracing::warn!("Ledger deposit notification stream ended");
                        break;
                    };
                    let Some(inner) = session.upgrade() else {
                        break;
                    };
                    inner.apply_deposit_notification(notification).await;
                }
            }
        }
    });
}
