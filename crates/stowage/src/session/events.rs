//! Session status stream
//!
//! Every deposit and upload transition is published as a full entity snapshot. Subscribers
//! pick the topics they care about; a subscriber registered on overlapping topics still gets
//! each event once.

use serde::{Deserialize, Serialize};
use stowage_common::pub_sub::{ActiveSubscription, Event};
use stowage_common::{Deposit, Error, UploadJob};
use uuid::Uuid;

use super::Session;

/// Snapshot published on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Deposit created or resolved
    Deposit(Deposit),
    /// Upload job moved
    Upload(UploadJob),
}

impl From<Deposit> for SessionEvent {
    fn from(deposit: Deposit) -> Self {
        Self::Deposit(deposit)
    }
}

impl From<UploadJob> for SessionEvent {
    fn from(job: UploadJob) -> Self {
        Self::Upload(job)
    }
}

/// Subscription topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionTopic {
    /// Everything
    All,
    /// Every deposit
    Deposits,
    /// Every upload job
    Uploads,
    /// One deposit
    Deposit(Uuid),
    /// One upload job
    Upload(Uuid),
}

impl Event for SessionEvent {
    type Topic = SessionTopic;

    fn get_topics(&self) -> Vec<Self::Topic> {
        match self {
            Self::Deposit(deposit) => vec![
                SessionTopic::All,
                SessionTopic::Deposits,
                SessionTopic::Deposit(deposit.id),
            ],
            Self::Upload(job) => vec![
                SessionTopic::All,
                SessionTopic::Uploads,
                SessionTopic::Upload(job.id),
            ],
        }
    }
}

/// Subscription to the session status stream
pub type SessionSubscription = ActiveSubscription<SessionEvent>;

impl Session {
    /// Subscribe to a set of topics
    ///
    /// Only transitions published after this call are delivered.
    pub fn subscribe(&self, topics: Vec<SessionTopic>) -> Result<SessionSubscription, Error> {
        Ok(self.inner.event_manager.subscribe(topics)?)
    }

    /// Subscribe to every transition of the session
    pub fn events(&self) -> Result<SessionSubscription, Error> {
        self.subscribe(vec![SessionTopic::All])
    }
}
