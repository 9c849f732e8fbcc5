//! Session settings

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stowage_common::{Amount, Error};

/// What the coordinator does when a job cannot be funded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopUpPolicy {
    /// Fail the placement with `PlacementRejected`
    #[default]
    Never,
    /// Deposit the shortfall once per job and wait for it
    Shortfall,
}

/// Cost estimate for an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Flat fee per placement
    pub base_fee: Amount,
    /// Price per started KiB
    pub price_per_kib: Amount,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            base_fee: Amount::ONE,
            price_per_kib: Amount::ONE,
        }
    }
}

impl Pricing {
    /// Estimated cost for an artifact of `size` bytes
    pub fn estimate(&self, size: u64) -> Result<Amount, Error> {
        let kib = size.div_ceil(1024);
        let variable = u64::from(self.price_per_kib)
            .checked_mul(kib)
            .ok_or(stowage_common::amount::Error::AmountOverflow)?;

        Ok(Amount::try_sum([self.base_fee, variable.into()])?)
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Budget for one placement request
    pub placement_timeout_secs: u64,
    /// Budget for one settlement request
    pub settlement_timeout_secs: u64,
    /// How long a job waits for a pending deposit before giving up
    pub funding_timeout_secs: u64,
    /// Funding behaviour
    pub top_up: TopUpPolicy,
    /// Cost estimate
    pub pricing: Pricing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placement_timeout_secs: 30,
            settlement_timeout_secs: 60,
            funding_timeout_secs: 120,
            top_up: TopUpPolicy::default(),
            pricing: Pricing::default(),
        }
    }
}

impl SessionConfig {
    /// Placement timeout
    pub fn placement_timeout(&self) -> Duration {
        Duration::from_secs(self.placement_timeout_secs)
    }

    /// Settlement timeout
    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement_timeout_secs)
    }

    /// Funding timeout
    pub fn funding_timeout(&self) -> Duration {
        Duration::from_secs(self.funding_timeout_secs)
    }
}
