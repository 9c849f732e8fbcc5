//! Pub-sub producer

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::subscriber::{ActiveSubscription, Subscriber};
use super::{Error, Event};

/// Subscriber Receiver
pub type SubReceiver<E> = mpsc::UnboundedReceiver<E>;

/// Internal Index Tree
pub type TopicTree<E> = Arc<
    RwLock<
        BTreeMap<
            // Topic with a subscription unique ID
            (<E as Event>::Topic, usize),
            Subscriber<E>,
        >,
    >,
>;

/// Manager
pub struct Pubsub<E>
where
    E: Event,
{
    listeners_topics: TopicTree<E>,
    unique_subscription_counter: AtomicUsize,
    active_subscribers: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl<E> fmt::Debug for Pubsub<E>
where
    E: Event,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pubsub")
            .field("active_subscribers", &self.active_subscribers())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E> Default for Pubsub<E>
where
    E: Event,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Pubsub<E>
where
    E: Event,
{
    /// Create a new instance
    pub fn new() -> Self {
        Self {
            listeners_topics: Default::default(),
            unique_subscription_counter: 0.into(),
            active_subscribers: Arc::new(0.into()),
            closed: false.into(),
        }
    }

    /// Total number of active subscribers, it is not the number of active topics being subscribed
    pub fn active_subscribers(&self) -> usize {
        self.active_subscribers
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Whether [`Pubsub::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Broadcast an event to all listeners right away
    ///
    /// Each subscriber receives the event at most once, even if it subscribed to several of
    /// the event's topics.
    pub fn publish<T>(&self, event: T)
    where
        T: Into<E>,
    {
        let event = event.into();
        let index_storage = self.listeners_topics.read();

        let mut sent = HashSet::new();
        for topic in event.get_topics() {
            for ((subscription_index, unique_id), sender) in
                index_storage.range((topic.clone(), 0)..)
            {
                if subscription_index.cmp(&topic) != Ordering::Equal {
                    break;
                }
                if !sent.insert(*unique_id) {
                    continue;
                }
                sender.send(event.clone());
            }
        }
    }

    /// Subscribe to a set of topics
    pub fn subscribe(&self, topics: Vec<E::Topic>) -> Result<ActiveSubscription<E>, Error> {
        if topics.is_empty() {
            return Err(Error::NoTopics);
        }

        if self.is_closed() {
            return Err(Error::Closed);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let sender = Subscriber::new(sender);

        let mut index_storage = self.listeners_topics.write();
        let subscription_internal_id = self
            .unique_subscription_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        self.active_subscribers
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        for topic in topics.iter() {
            index_storage.insert((topic.clone(), subscription_internal_id), sender.clone());
        }
        drop(index_storage);

        Ok(ActiveSubscription::new(
            subscription_internal_id,
            self.active_subscribers.clone(),
            self.listeners_topics.clone(),
            topics,
            receiver,
        ))
    }

    /// Drop every listener, ending all subscription streams
    pub fn close(&self) {
        self.closed
            .store(true, std::sync::atomic::Ordering::Release);
        self.listeners_topics.write().clear();
    }
}
