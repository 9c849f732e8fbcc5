//! Active subscription
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::pubsub::{SubReceiver, TopicTree};
use super::Event;

/// Active Subscription
///
/// Unregisters itself from the manager when dropped.
pub struct ActiveSubscription<E>
where
    E: Event,
{
    id: usize,
    active_subscribers: Arc<AtomicUsize>,
    topics: TopicTree<E>,
    subscribed_to: Vec<E::Topic>,
    receiver: SubReceiver<E>,
}

impl<E> fmt::Debug for ActiveSubscription<E>
where
    E: Event,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("id", &self.id)
            .field("subscribed_to", &self.subscribed_to)
            .finish()
    }
}

impl<E> ActiveSubscription<E>
where
    E: Event,
{
    /// Creates a new instance
    pub fn new(
        id: usize,
        active_subscribers: Arc<AtomicUsize>,
        topics: TopicTree<E>,
        subscribed_to: Vec<E::Topic>,
        receiver: SubReceiver<E>,
    ) -> Self {
        Self {
            id,
            active_subscribers,
            subscribed_to,
            topics,
            receiver,
        }
    }

    /// Receives the next event, `None` once the manager has been closed or dropped
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    /// Try receive an event or return None right away
    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Topics of this subscription
    pub fn topics(&self) -> &[E::Topic] {
        &self.subscribed_to
    }
}

// Nothing in the subscription is pinned structurally
impl<E> Unpin for ActiveSubscription<E> where E: Event {}

impl<E> Stream for ActiveSubscription<E>
where
    E: Event,
{
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<E> Drop for ActiveSubscription<E>
where
    E: Event,
{
    fn drop(&mut self) {
        // remove the listener
        let mut topics = self.topics.write();
        for index in self.subscribed_to.drain(..) {
            topics.remove(&(index, self.id));
        }

        // decrement the number of active subscribers
        self.active_subscribers
            .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Lightweight sink used by the producer to send events to one subscriber.
pub struct Subscriber<E>
where
    E: Event,
{
    inner: mpsc::UnboundedSender<E>,
}

impl<E> fmt::Debug for Subscriber<E>
where
    E: Event,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl<E> Clone for Subscriber<E>
where
    E: Event,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Subscriber<E>
where
    E: Event,
{
    /// Create a new instance
    pub fn new(inner: mpsc::UnboundedSender<E>) -> Self {
        Self { inner }
    }

    /// Send a message, a receiver that went away is ignored
    pub fn send(&self, event: E) {
        let _ = self.inner.send(event);
    }
}
