//! Snapshot publisher
//!
//! Drives a [`VersionStatusAggregator`] from a [`Subscription`] and exposes the
//! result through a `watch` channel, so any observer can poll or await the
//! latest [`StatusSnapshot`].

use crate::aggregate::{ApplyOutcome, StatusSnapshot, VersionStatusAggregator};
use crate::error::StatusError;
use crate::feed::{FeedItem, Subscription};
use tokio::sync::watch;

/// Folds feed items into an aggregator and publishes snapshots
#[derive(Debug)]
pub struct StatusTracker {
    aggregator: VersionStatusAggregator,
    connected: bool,
    snapshots: watch::Sender<StatusSnapshot>,
}

impl StatusTracker {
    /// Create a tracker and the receiver observers read from
    #[must_use]
    pub fn new(aggregator: VersionStatusAggregator) -> (Self, watch::Receiver<StatusSnapshot>) {
        let (snapshots, receiver) = watch::channel(aggregator.snapshot(true));
        (
            Self {
                aggregator,
                connected: true,
                snapshots,
            },
            receiver,
        )
    }

    #[inline]
    #[must_use]
    pub fn aggregator(&self) -> &VersionStatusAggregator {
        &self.aggregator
    }

    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handle one feed item
    ///
    /// A fault marks the tracker disconnected, keeps the last aggregate and
    /// comes back as [`StatusError::Transport`]. The next event marks it
    /// connected again.
    ///
    /// # Errors
    /// [`StatusError::Transport`] for a fault item
    pub fn handle(&mut self, item: FeedItem) -> Result<ApplyOutcome, StatusError> {
        match item {
            FeedItem::Event(event) => {
                let reconnected = !self.connected;
                self.connected = true;
                let outcome = self.aggregator.apply(&event);
                if outcome.is_accepted() || reconnected {
                    self.publish();
                }
                Ok(outcome)
            }
            FeedItem::Fault(reason) => {
                let error = StatusError::Transport(reason);
                tracing::warn!(
                    version_id = %self.aggregator.version_id(),
                    error = %error,
                    retryable = error.is_retryable(),
                    "status feed fault; keeping last known status"
                );
                if self.connected {
                    self.connected = false;
                    self.publish();
                }
                Err(error)
            }
        }
    }

    /// Consume the subscription until the feed closes
    ///
    /// The subscription is released when this returns or when the future is dropped.
    /// Items the feed dropped for this subscription count as a fault.
    pub async fn run(mut self, mut subscription: Subscription) -> VersionStatusAggregator {
        while let Some(item) = subscription.recv().await {
            // Faults are logged in `handle`; the stream keeps going.
            let _ = self.handle(item);
            let lost = subscription.take_dropped();
            if lost > 0 {
                let _ = self.handle(FeedItem::Fault(format!("{lost} status events lost while lagging")));
            }
        }

        tracing::info!(
            version_id = %self.aggregator.version_id(),
            status = %self.aggregator.status(),
            "status feed closed"
        );
        self.connected = false;
        self.publish();
        self.aggregator
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(self.aggregator.snapshot(self.connected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScopeStatusEvent;
    use crate::feed::StatusFeed;
    use audit_model::{AnalysisStatus, ScopeId, VersionId};

    fn aggregator() -> VersionStatusAggregator {
        let mut agg = VersionStatusAggregator::new(VersionId::new("v1"), AnalysisStatus::Waiting);
        agg.track(ScopeId::new("s1"), AnalysisStatus::Waiting);
        agg.track(ScopeId::new("s2"), AnalysisStatus::Waiting);
        agg
    }

    #[test]
    fn fault_keeps_last_status() {
        let (mut tracker, snapshots) = StatusTracker::new(aggregator());
        tracker
            .handle(FeedItem::Event(ScopeStatusEvent::new("s1", AnalysisStatus::Processing)))
            .unwrap();
        let err = tracker
            .handle(FeedItem::Fault("connection reset".to_string()))
            .unwrap_err();
        assert!(matches!(&err, StatusError::Transport(reason) if reason == "connection reset"));
        assert!(err.is_retryable());

        let snapshot = snapshots.borrow().clone();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.status, AnalysisStatus::Processing);
    }

    #[test]
    fn event_after_fault_reconnects() {
        let (mut tracker, snapshots) = StatusTracker::new(aggregator());
        assert!(tracker.handle(FeedItem::Fault("timeout".to_string())).is_err());
        let outcome = tracker
            .handle(FeedItem::Event(ScopeStatusEvent::new("s2", AnalysisStatus::Failed)))
            .unwrap();
        assert!(outcome.is_accepted());

        assert!(tracker.is_connected());
        assert_eq!(snapshots.borrow().status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn run_folds_until_closed_and_releases() {
        let feed = StatusFeed::default();
        let version_id = VersionId::new("v1");
        let subscription = feed.subscribe(version_id.clone());
        let (tracker, snapshots) = StatusTracker::new(aggregator());
        let task = tokio::spawn(tracker.run(subscription));

        for (scope, status) in [
            ("s1", AnalysisStatus::Processing),
            ("s2", AnalysisStatus::Success),
            ("s1", AnalysisStatus::Success),
        ] {
            feed.publish(&version_id, ScopeStatusEvent::new(scope, status));
        }
        feed.close_version(&version_id);

        let aggregator = task.await.unwrap();
        assert_eq!(aggregator.status(), AnalysisStatus::Success);
        assert_eq!(snapshots.borrow().status, AnalysisStatus::Success);
        assert!(!snapshots.borrow().connected);
        assert_eq!(feed.subscriber_count(&version_id), 0);
    }

    #[tokio::test]
    async fn lag_is_reported_as_a_fault() {
        let feed = StatusFeed::new(1);
        let version_id = VersionId::new("v1");
        let subscription = feed.subscribe(version_id.clone());
        let (tracker, mut snapshots) = StatusTracker::new(aggregator());

        // Nobody drains the buffer yet, so the second event is dropped
        feed.publish(&version_id, ScopeStatusEvent::new("s1", AnalysisStatus::Processing));
        assert_eq!(
            feed.publish(&version_id, ScopeStatusEvent::new("s2", AnalysisStatus::Processing)),
            0
        );

        let task = tokio::spawn(tracker.run(subscription));
        snapshots.wait_for(|snapshot| !snapshot.connected).await.unwrap();
        assert_eq!(snapshots.borrow().status, AnalysisStatus::Processing);

        feed.close_version(&version_id);
        task.await.unwrap();
    }
}
