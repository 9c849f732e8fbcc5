//! In-memory storage service

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stowage_common::{Amount, Fingerprint, StorageService};
use tokio::sync::Mutex;
use tokio::time;
use tracing::instrument;

use crate::error::Error;
use crate::jittered_delay;

/// Fake storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeStorageConfig {
    /// Providers taking placements in turn, none means `NoProviderAvailable`
    pub providers: Vec<String>,
    /// Lower bound of the placement delay
    pub min_delay_ms: u64,
    /// Upper bound of the placement delay
    pub max_delay_ms: u64,
}

impl Default for FakeStorageConfig {
    fn default() -> Self {
        Self {
            providers: vec!["provider-a".to_string(), "provider-b".to_string()],
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Placement recorded by [`FakeStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Placed artifact
    pub fingerprint: Fingerprint,
    /// Chosen provider
    pub provider: String,
    /// Funds the session reserved for it
    pub reserved_funds: Amount,
    /// Returned reference
    pub provider_ref: String,
}

/// In-memory [`StorageService`]
#[derive(Debug)]
pub struct FakeStorage {
    config: FakeStorageConfig,
    next_provider: AtomicUsize,
    unreachable: AtomicBool,
    rejection: Mutex<Option<String>>,
    placement_delay: Mutex<Option<Duration>>,
    placements: Mutex<Vec<Placement>>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new(FakeStorageConfig::default())
    }
}

impl FakeStorage {
    /// Create new [`FakeStorage`]
    pub fn new(config: FakeStorageConfig) -> Self {
        Self {
            config,
            next_provider: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
            rejection: Mutex::new(None),
            placement_delay: Mutex::new(None),
            placements: Mutex::new(Vec::new()),
        }
    }

    /// Make every placement fail with `UnreachableService`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reject every placement with `reason`
    pub async fn reject_placements(&self, reason: Option<String>) {
        *self.rejection.lock().await = reason;
    }

    /// Fixed placement delay replacing the configured jitter
    pub async fn set_placement_delay(&self, delay: Option<Duration>) {
        *self.placement_delay.lock().await = delay;
    }

    /// Placements made so far
    pub async fn placements(&self) -> Vec<Placement> {
        self.placements.lock().await.clone()
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    #[instrument(skip(self))]
    async fn place(
        &self,
        fingerprint: &Fingerprint,
        reserved_funds: Amount,
    ) -> Result<String, stowage_common::Error> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Unreachable("Storage").into());
        }

        let delay = match *self.placement_delay.lock().await {
            Some(delay) => delay,
            None => jittered_delay(self.config.min_delay_ms, self.config.max_delay_ms),
        };
        if !delay.is_zero() {
            time::sleep(delay).await;
        }

        if let Some(reason) = self.rejection.lock().await.clone() {
            return Err(Error::PlacementRejected(reason).into());
        }

        if self.config.providers.is_empty() {
            return Err(Error::NoProvider.into());
        }

        let index = self.next_provider.fetch_add(1, Ordering::SeqCst) % self.config.providers.len();
        let provider = self.config.providers[index].clone();
        let provider_ref = format!("{provider}/{fingerprint}");

        tracing::debug!("Fake storage placed {} on {}", fingerprint, provider);

        self.placements.lock().await.push(Placement {
            fingerprint: *fingerprint,
            provider,
            reserved_funds,
            provider_ref: provider_ref.clone(),
        });

        Ok(provider_ref)
    }
}
