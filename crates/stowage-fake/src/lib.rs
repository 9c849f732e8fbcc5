//! Stowage Fake Backends
//!
//! Used for testing and demos, balances and placements live in memory.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::time::Duration;

use rand::Rng;

pub mod error;
mod ledger;
mod storage;

pub use ledger::{FakeLedger, FakeLedgerConfig, Settlement};
pub use storage::{FakeStorage, FakeStorageConfig, Placement};

/// Random delay between `min_ms` and `max_ms`
fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }

    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}
