//! Publish–subscribe pattern.
//!
//! This is a generic, type agnostic publish-subscribe manager used to push live status
//! updates to any number of consumers.
//!
//! Subscribers register interest in a set of topics. Events are generic and must
//! implement the [`Event`] trait to tell the manager which topics they belong to.
//!
//! Publishing is synchronous and never blocks: every subscriber owns an unbounded
//! channel, so each subscriber observes events in exactly the order they were published.
//! There is no backfill; a subscription only sees events published after it was created.
use std::fmt::Debug;

mod error;
mod pubsub;
mod subscriber;

pub use self::error::Error;
pub use self::pubsub::{Pubsub, SubReceiver, TopicTree};
pub use self::subscriber::{ActiveSubscription, Subscriber};

/// Event trait
pub trait Event: Clone + Send + Sync + 'static {
    /// Generic Topic
    ///
    /// It must be sortable to be stored in a BTree for in-memory matching
    type Topic: Clone + Eq + Ord + Debug + Send + Sync + 'static;

    /// To topics
    fn get_topics(&self) -> Vec<Self::Topic>;
}
