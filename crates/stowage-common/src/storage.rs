//! Storage service capability

use async_trait::async_trait;

use crate::{Amount, Error, Fingerprint};

/// Remote storage service placing fingerprinted artifacts with providers
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Place an artifact with a provider
    ///
    /// `reserved_funds` is the amount the session has earmarked to pay for this placement.
    /// Returns the provider reference, [`Error::NoProviderAvailable`] or
    /// [`Error::PlacementRejected`].
    async fn place(&self, fingerprint: &Fingerprint, reserved_funds: Amount)
        -> Result<String, Error>;
}
