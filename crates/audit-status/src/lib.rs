//! Audit Status
//!
//! Folds a stream of per-scope status events into one deterministic version status.
//!
//! # Core Concepts
//!
//! - [`ScopeStatusMachine`]: State of one scope; accepts re-runs, never rejects a transition
//! - [`aggregate`]: Fixed-precedence fold over scope statuses
//! - [`VersionStatusAggregator`]: Tracks every scope of a version and recomputes on each accepted transition
//! - [`StatusFeed`]: Per-version fan-out of push events with scoped [`Subscription`] handles
//! - [`StatusTracker`]: Drives an aggregator from a subscription and publishes [`StatusSnapshot`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_status::{StatusFeed, StatusTracker, VersionStatusAggregator};
//!
//! let feed = StatusFeed::default();
//! let subscription = feed.subscribe(version.id().clone());
//! let (tracker, snapshots) = StatusTracker::new(VersionStatusAggregator::from_version(&version));
//! tokio::spawn(tracker.run(subscription));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod aggregate;
mod error;
mod event;
mod feed;
mod machine;
mod tracker;

pub use aggregate::{
    aggregate, ApplyOutcome, DropReason, ScopeProgress, StatusSnapshot, VersionStatusAggregator,
};
pub use error::StatusError;
pub use event::ScopeStatusEvent;
pub use feed::{FeedItem, StatusFeed, Subscription, DEFAULT_EVENT_BUFFER};
pub use machine::{classify, ScopeStatusMachine, Transition, TransitionKind};
pub use tracker::StatusTracker;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
