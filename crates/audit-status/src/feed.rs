//! Push-event fan-out
//!
//! A [`StatusFeed`] routes events for a version to every live [`Subscription`]
//! on that version. A subscription deregisters itself when dropped, so a
//! session that ends on any path stops receiving events.
//!
//! Delivery never waits on a subscriber. An item that does not fit a full
//! buffer is dropped for that subscriber and counted; the subscriber learns
//! about the gap through [`Subscription::take_dropped`].

use crate::event::ScopeStatusEvent;
use audit_model::VersionId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default per-subscription channel capacity
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Item delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Event(ScopeStatusEvent),
    /// Transport-level failure. Observers keep their last known status.
    Fault(String),
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<FeedItem>,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug)]
struct FeedInner {
    subscribers: DashMap<VersionId, Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Per-version registry of event subscribers
#[derive(Debug, Clone)]
pub struct StatusFeed {
    inner: Arc<FeedInner>,
}

impl StatusFeed {
    /// Create a feed with the given per-subscription buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register for events on one version
    #[must_use]
    pub fn subscribe(&self, version_id: VersionId) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.inner
            .subscribers
            .entry(version_id.clone())
            .or_default()
            .push(Subscriber {
                id,
                sender,
                dropped: Arc::clone(&dropped),
            });

        tracing::debug!(version_id = %version_id, subscription = id, "subscribed to status feed");

        Subscription {
            feed: Arc::clone(&self.inner),
            version_id,
            id,
            receiver,
            dropped,
        }
    }

    /// Deliver an event to every subscriber of `version_id`
    ///
    /// Returns the number of subscribers reached. Events for versions nobody
    /// is subscribed to are dropped, as are events for a subscriber whose
    /// buffer is full.
    pub fn publish(&self, version_id: &VersionId, event: ScopeStatusEvent) -> usize {
        self.deliver(version_id, FeedItem::Event(event))
    }

    /// Report a transport failure to every subscriber of `version_id`
    pub fn fault(&self, version_id: &VersionId, reason: impl Into<String>) -> usize {
        self.deliver(version_id, FeedItem::Fault(reason.into()))
    }

    /// Close every subscription of a version; their streams end
    pub fn close_version(&self, version_id: &VersionId) {
        self.inner.subscribers.remove(version_id);
    }

    #[must_use]
    pub fn subscriber_count(&self, version_id: &VersionId) -> usize {
        self.inner
            .subscribers
            .get(version_id)
            .map_or(0, |entry| entry.len())
    }

    fn deliver(&self, version_id: &VersionId, item: FeedItem) -> usize {
        let Some(entry) = self.inner.subscribers.get(version_id) else {
            tracing::debug!(version_id = %version_id, "no subscribers; event dropped");
            return 0;
        };

        let mut delivered = 0;
        for subscriber in entry.iter() {
            match subscriber.sender.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let lost = subscriber.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        version_id = %version_id,
                        subscription = subscriber.id,
                        lost,
                        "subscriber lagging; item dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

/// Scoped registration on a [`StatusFeed`]
///
/// Dropping the handle deregisters it.
#[derive(Debug)]
pub struct Subscription {
    feed: Arc<FeedInner>,
    version_id: VersionId,
    id: u64,
    receiver: mpsc::Receiver<FeedItem>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    #[inline]
    #[must_use]
    pub fn version_id(&self) -> &VersionId {
        &self.version_id
    }

    /// Next item, or `None` once the feed closed this version
    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.receiver.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<FeedItem> {
        self.receiver.try_recv().ok()
    }

    /// Items dropped because this subscription's buffer was full, since the
    /// last call
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    /// Deregister now
    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let now_empty = match self.feed.subscribers.get_mut(&self.version_id) {
            Some(mut entry) => {
                entry.retain(|subscriber| subscriber.id != self.id);
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.feed
                .subscribers
                .remove_if(&self.version_id, |_, subscribers| subscribers.is_empty());
        }
        tracing::debug!(version_id = %self.version_id, subscription = self.id, "status feed subscription released");
    }
}
